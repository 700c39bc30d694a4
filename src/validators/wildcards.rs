//! XSD wildcards
//!
//! `xs:any` and `xs:anyAttribute` share one [`Wildcard`] component: a
//! namespace constraint, an optional list of excluded names and the
//! processContents mode that tells the validator how deep to look at
//! matched items.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::namespaces::QName;

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub enum ProcessContents {
    /// Skip validation entirely
    Skip,
    /// Validate if a declaration is found, otherwise accept
    Lax,
    /// Validate strictly; the item must be declared
    #[default]
    Strict,
}

impl ProcessContents {
    /// Parse a processContents value
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "skip" => Ok(Self::Skip),
            other => Err(Error::Value(format!(
                "invalid processContents value '{}'",
                other
            ))),
        }
    }

    /// Whether this mode is at least as strong as `other`
    pub fn is_restriction_of(&self, other: &Self) -> bool {
        self >= other
    }
}

impl fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint of a wildcard
///
/// `None` stands for "no namespace" (`##local`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// `##any`
    #[default]
    Any,
    /// An explicit set of namespaces
    Enumeration(BTreeSet<Option<String>>),
    /// Every namespace except the listed ones (`##other`, `notNamespace`)
    Not(BTreeSet<Option<String>>),
}

fn parse_namespace_tokens(
    value: &str,
    target_namespace: Option<&str>,
) -> Result<BTreeSet<Option<String>>> {
    let mut set = BTreeSet::new();
    for token in value.split_whitespace() {
        match token {
            "##local" => {
                set.insert(None);
            }
            "##targetNamespace" => {
                set.insert(target_namespace.map(String::from));
            }
            s if s.starts_with("##") => {
                return Err(Error::Value(format!(
                    "wrong value '{}' in wildcard namespace list",
                    s
                )))
            }
            s => {
                set.insert(Some(s.to_string()));
            }
        }
    }
    Ok(set)
}

impl NamespaceConstraint {
    /// Build from the `namespace` attribute value
    pub fn from_namespace_attr(value: &str, target_namespace: Option<&str>) -> Result<Self> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => {
                let mut excluded = BTreeSet::new();
                excluded.insert(None);
                excluded.insert(target_namespace.map(String::from));
                Ok(Self::Not(excluded))
            }
            other => Ok(Self::Enumeration(parse_namespace_tokens(
                other,
                target_namespace,
            )?)),
        }
    }

    /// Build from the XSD 1.1 `notNamespace` attribute value
    pub fn from_not_namespace_attr(value: &str, target_namespace: Option<&str>) -> Result<Self> {
        Ok(Self::Not(parse_namespace_tokens(value, target_namespace)?))
    }

    /// Whether a namespace is admitted
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        let key = namespace.map(String::from);
        match self {
            Self::Any => true,
            Self::Enumeration(set) => set.contains(&key),
            Self::Not(set) => !set.contains(&key),
        }
    }

    /// Whether a namespace mentioned nowhere in the constraint is admitted
    pub fn allows_unlisted(&self) -> bool {
        !matches!(self, Self::Enumeration(_))
    }

    /// Namespaces named explicitly by the constraint
    pub fn listed(&self) -> impl Iterator<Item = &Option<String>> {
        let set = match self {
            Self::Any => None,
            Self::Enumeration(set) | Self::Not(set) => Some(set),
        };
        set.into_iter().flatten()
    }

    /// Whether every namespace allowed here is allowed by `other`
    pub fn is_subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Any, _) => false,
            (Self::Enumeration(a), Self::Enumeration(b)) => a.is_subset(b),
            (Self::Enumeration(a), Self::Not(b)) => a.is_disjoint(b),
            (Self::Not(_), Self::Enumeration(_)) => false,
            (Self::Not(a), Self::Not(b)) => b.is_subset(a),
        }
    }

    /// Union, used when extending an attribute wildcard
    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => Self::Any,
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::Enumeration(a.union(b).cloned().collect())
            }
            (Self::Not(a), Self::Not(b)) => {
                let common: BTreeSet<_> = a.intersection(b).cloned().collect();
                if common.is_empty() {
                    Self::Any
                } else {
                    Self::Not(common)
                }
            }
            (Self::Enumeration(e), Self::Not(n)) | (Self::Not(n), Self::Enumeration(e)) => {
                let remaining: BTreeSet<_> = n.difference(e).cloned().collect();
                if remaining.is_empty() {
                    Self::Any
                } else {
                    Self::Not(remaining)
                }
            }
        }
    }

    /// Intersection, used when combining attribute group wildcards
    pub fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, x) | (x, Self::Any) => x.clone(),
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::Enumeration(a.intersection(b).cloned().collect())
            }
            (Self::Not(a), Self::Not(b)) => Self::Not(a.union(b).cloned().collect()),
            (Self::Enumeration(e), Self::Not(n)) | (Self::Not(n), Self::Enumeration(e)) => {
                Self::Enumeration(e.difference(n).cloned().collect())
            }
        }
    }
}

impl fmt::Display for NamespaceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |set: &BTreeSet<Option<String>>| {
            set.iter()
                .map(|ns| ns.as_deref().unwrap_or("##local").to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        match self {
            Self::Any => write!(f, "##any"),
            Self::Enumeration(set) => write!(f, "{}", list(set)),
            Self::Not(set) => write!(f, "not({})", list(set)),
        }
    }
}

/// Element or attribute wildcard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Wildcard {
    /// Namespace constraint
    pub namespaces: NamespaceConstraint,
    /// Names excluded even when their namespace is admitted (XSD 1.1)
    pub not_qnames: Vec<QName>,
    /// How matched items are validated
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Wildcard matching anything, with the given processing mode
    pub fn any(process_contents: ProcessContents) -> Self {
        Self {
            namespaces: NamespaceConstraint::Any,
            not_qnames: Vec::new(),
            process_contents,
        }
    }

    /// Whether a qualified name is matched
    pub fn matches(&self, name: &QName) -> bool {
        self.namespaces.allows(name.namespace()) && !self.not_qnames.contains(name)
    }

    /// Whether any name in the namespace can be matched
    pub fn matches_namespace(&self, namespace: Option<&str>) -> bool {
        self.namespaces.allows(namespace)
    }

    /// Whether names from a namespace not listed anywhere are matched
    pub fn matches_unlisted(&self) -> bool {
        self.namespaces.allows_unlisted()
    }

    /// Whether this wildcard is a valid restriction of `base`
    pub fn is_restriction_of(&self, base: &Wildcard) -> bool {
        self.namespaces.is_subset_of(&base.namespaces)
            && self.process_contents.is_restriction_of(&base.process_contents)
            && base.not_qnames.iter().all(|q| !self.matches(q))
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "any({}, {})", self.namespaces, self.process_contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TNS: Option<&str> = Some("http://example.com/tns");

    #[test]
    fn test_process_contents_restriction() {
        assert!(ProcessContents::Strict.is_restriction_of(&ProcessContents::Lax));
        assert!(ProcessContents::Lax.is_restriction_of(&ProcessContents::Skip));
        assert!(!ProcessContents::Skip.is_restriction_of(&ProcessContents::Strict));
        assert!(ProcessContents::from_str("sloppy").is_err());
    }

    #[test]
    fn test_other_excludes_target_and_local() {
        let c = NamespaceConstraint::from_namespace_attr("##other", TNS).unwrap();
        assert!(!c.allows(TNS));
        assert!(!c.allows(None));
        assert!(c.allows(Some("urn:elsewhere")));
        assert!(c.allows_unlisted());
    }

    #[test]
    fn test_enumeration() {
        let c = NamespaceConstraint::from_namespace_attr("##targetNamespace ##local urn:x", TNS)
            .unwrap();
        assert!(c.allows(TNS));
        assert!(c.allows(None));
        assert!(c.allows(Some("urn:x")));
        assert!(!c.allows(Some("urn:y")));
        assert!(!c.allows_unlisted());
        assert_eq!(c.listed().count(), 3);
        assert!(NamespaceConstraint::from_namespace_attr("##bogus", TNS).is_err());
    }

    #[test]
    fn test_subset() {
        let any = NamespaceConstraint::Any;
        let other = NamespaceConstraint::from_namespace_attr("##other", TNS).unwrap();
        let x = NamespaceConstraint::from_namespace_attr("urn:x", TNS).unwrap();
        assert!(x.is_subset_of(&other));
        assert!(other.is_subset_of(&any));
        assert!(!any.is_subset_of(&other));
        assert!(!other.is_subset_of(&x));
    }

    #[test]
    fn test_union_and_intersection() {
        let x = NamespaceConstraint::from_namespace_attr("urn:x", TNS).unwrap();
        let y = NamespaceConstraint::from_namespace_attr("urn:y", TNS).unwrap();
        let both = x.union(&y);
        assert!(both.allows(Some("urn:x")) && both.allows(Some("urn:y")));
        assert!(x.intersection(&y) == NamespaceConstraint::Enumeration(BTreeSet::new()));
        assert_eq!(x.intersection(&NamespaceConstraint::Any), x);
    }

    #[test]
    fn test_not_qname() {
        let mut w = Wildcard::any(ProcessContents::Lax);
        w.not_qnames.push(QName::namespaced("urn:x", "secret"));
        assert!(w.matches(&QName::namespaced("urn:x", "open")));
        assert!(!w.matches(&QName::namespaced("urn:x", "secret")));
    }
}
