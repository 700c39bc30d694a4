//! XSD particles
//!
//! A particle pairs a term (element declaration, wildcard or model group)
//! with its occurrence bounds. Terms reference declarations through handles,
//! never through owned copies, so recursive models stay finite.

use crate::error::{Error, Result};

use super::base::{ElementId, GroupId};
use super::groups::ModelGroup;
use super::wildcards::Wildcard;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if an occurrence count exceeds the maximum
    pub fn is_exceeded(&self, count: u32) -> bool {
        matches!(self.max, Some(max) if count > max)
    }

    /// Check if this range lies within `other`
    pub fn has_occurs_restriction(&self, other: &Occurs) -> bool {
        if self.min < other.min {
            return false;
        }
        if self.max == Some(0) {
            return true;
        }
        match (self.max, other.max) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        }
    }

    /// Sum of two ranges (particles in sequence)
    pub fn add(self, other: Occurs) -> Occurs {
        Occurs {
            min: self.min.saturating_add(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                _ => None,
            },
        }
    }

    /// Product of two ranges (a particle repeated by its group)
    pub fn multiply(self, other: Occurs) -> Occurs {
        Occurs {
            min: self.min.saturating_mul(other.min),
            max: match (self.max, other.max) {
                (Some(0), _) | (_, Some(0)) => Some(0),
                (Some(a), Some(b)) => Some(a.saturating_mul(b)),
                _ => None,
            },
        }
    }

    /// Widest of two ranges (alternatives of a choice)
    pub fn widen(self, other: Occurs) -> Occurs {
        Occurs {
            min: self.min.min(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl std::fmt::Display for Occurs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..unbounded", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = min_str.trim().parse::<u32>().map_err(|_| {
            Error::Value(format!(
                "minOccurs value '{}' is not a valid non-negative integer",
                min_str
            ))
        })?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = max_str.parse::<u32>().map_err(|_| {
                Error::Value(format!(
                    "maxOccurs value '{}' must be a non-negative integer or 'unbounded'",
                    max_str
                ))
            })?;
            if occurs.min > max {
                return Err(Error::Value(format!(
                    "minOccurs {} is greater than maxOccurs {}",
                    occurs.min, max
                )));
            }
            occurs.max = Some(max);
        }
        None if occurs.min > 1 => {
            return Err(Error::Value(format!(
                "minOccurs {} is greater than the default maxOccurs 1",
                occurs.min
            )))
        }
        None => {}
    }

    Ok(occurs)
}

/// The term of a particle
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Element declaration (local or a reference to a global)
    Element(ElementId),
    /// Element wildcard
    Wildcard(Wildcard),
    /// Reference to a named model group
    Group(GroupId),
    /// Anonymous model group
    Model(ModelGroup),
}

/// A term with occurrence bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// What occurs
    pub term: Term,
    /// How often
    pub occurs: Occurs,
}

impl Particle {
    /// Create a particle
    pub fn new(term: Term, occurs: Occurs) -> Self {
        Self { term, occurs }
    }

    /// Element particle
    pub fn element(id: ElementId, occurs: Occurs) -> Self {
        Self::new(Term::Element(id), occurs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs_restriction() {
        let base = Occurs::new(0, None);
        assert!(Occurs::once().has_occurs_restriction(&base));
        assert!(Occurs::new(2, Some(5)).has_occurs_restriction(&base));

        let bounded = Occurs::new(1, Some(3));
        assert!(Occurs::new(1, Some(2)).has_occurs_restriction(&bounded));
        assert!(!Occurs::new(0, Some(2)).has_occurs_restriction(&bounded));
        assert!(!Occurs::new(1, None).has_occurs_restriction(&bounded));
        assert!(Occurs::new(0, Some(0)).has_occurs_restriction(&Occurs::optional()));
    }

    #[test]
    fn test_parse_occurs() {
        assert_eq!(parse_occurs(None, None).unwrap(), Occurs::once());
        assert_eq!(parse_occurs(Some("0"), Some("5")).unwrap(), Occurs::new(0, Some(5)));
        assert_eq!(
            parse_occurs(Some("1"), Some("unbounded")).unwrap(),
            Occurs::new(1, None)
        );
        assert!(parse_occurs(Some("abc"), None).is_err());
        assert!(parse_occurs(None, Some("abc")).is_err());
        assert!(parse_occurs(Some("5"), Some("3")).is_err());
        assert!(parse_occurs(Some("5"), None).is_err());
    }

    #[test]
    fn test_occurs_arithmetic() {
        let sum = Occurs::new(1, Some(2)).add(Occurs::new(2, Some(3)));
        assert_eq!(sum, Occurs::new(3, Some(5)));
        assert_eq!(sum.add(Occurs::zero_or_more()).max, None);

        let product = Occurs::new(2, Some(3)).multiply(Occurs::new(2, Some(4)));
        assert_eq!(product, Occurs::new(4, Some(12)));
        assert_eq!(Occurs::zero_or_more().multiply(Occurs::new(0, Some(0))).max, Some(0));

        let wide = Occurs::new(2, Some(3)).widen(Occurs::new(1, Some(5)));
        assert_eq!(wide, Occurs::new(1, Some(5)));
        assert_eq!(wide.to_string(), "1..5");
    }
}
