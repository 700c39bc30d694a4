//! XSD model groups
//!
//! - xs:sequence - ordered content
//! - xs:choice - alternative content
//! - xs:all - unordered content, only at the top of a content model
//!
//! Named groups (`xs:group name="..."`) wrap a single model group and are
//! referenced from particles by [`GroupId`](super::base::GroupId).

use std::fmt;

use crate::namespaces::QName;

use super::globals::ComponentTable;
use super::particles::{Occurs, Particle, Term};

/// Model group compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compositor {
    /// Ordered sequence of particles
    #[default]
    Sequence,
    /// One of multiple alternatives
    Choice,
    /// Unordered set of particles
    All,
}

impl Compositor {
    /// Map an XSD element local name to a compositor
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sequence" => Some(Self::Sequence),
            "choice" => Some(Self::Choice),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A compositor with its particles
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelGroup {
    /// Compositor
    pub compositor: Compositor,
    /// Particles in document order
    pub particles: Vec<Particle>,
}

impl ModelGroup {
    /// Create a model group
    pub fn new(compositor: Compositor, particles: Vec<Particle>) -> Self {
        Self {
            compositor,
            particles,
        }
    }

    /// Empty sequence
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the group has no particles at all
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Range of element counts one pass through the group can produce
    pub fn effective_occurs(&self, table: &ComponentTable) -> Occurs {
        self.effective_occurs_at(table, 0)
    }

    fn effective_occurs_at(&self, table: &ComponentTable, depth: usize) -> Occurs {
        let mut ranges = self
            .particles
            .iter()
            .map(|p| particle_range(p, table, depth));
        match self.compositor {
            Compositor::Sequence | Compositor::All => {
                ranges.fold(Occurs::new(0, Some(0)), Occurs::add)
            }
            Compositor::Choice => match ranges.next() {
                Some(first) => ranges.fold(first, Occurs::widen),
                None => Occurs::new(0, Some(0)),
            },
        }
    }

    /// Whether the group accepts empty content
    pub fn is_emptiable(&self, table: &ComponentTable) -> bool {
        self.effective_occurs(table).min == 0
    }
}

fn particle_range(particle: &Particle, table: &ComponentTable, depth: usize) -> Occurs {
    let inner = match &particle.term {
        Term::Element(_) | Term::Wildcard(_) => Occurs::once(),
        Term::Model(group) => group.effective_occurs_at(table, depth + 1),
        // Circular group references are rejected at compile time; the depth
        // guard keeps a malformed table from recursing forever.
        Term::Group(id) if depth < 64 => table
            .group(*id)
            .model
            .effective_occurs_at(table, depth + 1),
        Term::Group(_) => Occurs::zero_or_more(),
    };
    inner.multiply(particle.occurs)
}

/// A named model group definition
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDef {
    /// Group name
    pub name: QName,
    /// The model group it stands for
    pub model: ModelGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compositor_from_tag() {
        assert_eq!(Compositor::from_tag("choice"), Some(Compositor::Choice));
        assert_eq!(Compositor::from_tag("group"), None);
        assert_eq!(Compositor::All.to_string(), "all");
    }

    #[test]
    fn test_effective_occurs() {
        use super::super::base::ElementId;
        let table = ComponentTable::empty();
        let seq = ModelGroup::new(
            Compositor::Sequence,
            vec![
                Particle::element(ElementId::new(0), Occurs::once()),
                Particle::element(ElementId::new(1), Occurs::new(0, Some(2))),
            ],
        );
        assert_eq!(seq.effective_occurs(&table), Occurs::new(1, Some(3)));
        assert!(!seq.is_emptiable(&table));

        let choice = ModelGroup::new(
            Compositor::Choice,
            vec![
                Particle::element(ElementId::new(0), Occurs::once()),
                Particle::element(ElementId::new(1), Occurs::optional()),
            ],
        );
        assert!(choice.is_emptiable(&table));
        assert!(ModelGroup::empty().is_emptiable(&table));
    }
}
