//! Base validator infrastructure
//!
//! Shared vocabulary of the schema machinery: the validation mode, the
//! typed handles used for every cross-component link, component categories
//! and derivation records.

use crate::error::{Error, Result};
use crate::namespaces::QName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validation mode for instance validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Stop at the first validation error
    #[default]
    Strict,
    /// Collect all reachable errors and keep going
    Lax,
    /// Only well-formedness, never raise validation errors
    Skip,
}

impl ValidationMode {
    /// Parse validation mode from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(ValidationMode::Strict),
            "lax" => Ok(ValidationMode::Lax),
            "skip" => Ok(ValidationMode::Skip),
            _ => Err(Error::Value(format!(
                "Invalid validation mode: '{}'. Must be 'strict', 'lax', or 'skip'",
                s
            ))),
        }
    }

    /// Get the mode as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lax => "lax",
            ValidationMode::Skip => "skip",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Position in the owning arena
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_handle!(
    /// Handle of a simple or complex type definition
    TypeId
);
define_handle!(
    /// Handle of an element declaration (global or local)
    ElementId
);
define_handle!(
    /// Handle of an attribute declaration (global or local)
    AttributeId
);
define_handle!(
    /// Handle of a named model group definition
    GroupId
);
define_handle!(
    /// Handle of a named attribute group definition
    AttributeGroupId
);
define_handle!(
    /// Handle of an identity constraint definition
    IdentityId
);

/// Symbol space of a top-level component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentCategory {
    /// Simple and complex type definitions share one symbol space
    Type,
    /// Element declarations
    Element,
    /// Attribute declarations
    Attribute,
    /// Model group definitions
    Group,
    /// Attribute group definitions
    AttributeGroup,
    /// Identity constraints (unique, key, keyref)
    IdentityConstraint,
    /// Notation declarations
    Notation,
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Type => "type",
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Group => "group",
            Self::AttributeGroup => "attributeGroup",
            Self::IdentityConstraint => "identity constraint",
            Self::Notation => "notation",
        };
        f.write_str(s)
    }
}

/// Key of a top-level component: `(namespace, local-name, category)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    /// Category (symbol space)
    pub category: ComponentCategory,
    /// Qualified name
    pub name: QName,
}

impl ComponentKey {
    /// Create a new key
    pub fn new(category: ComponentCategory, name: QName) -> Self {
        Self { category, name }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.name)
    }
}

/// How a type was derived from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DerivationMethod {
    /// Derivation by extension
    Extension,
    /// Derivation by restriction
    Restriction,
    /// Simple type derived by list
    List,
    /// Simple type derived by union
    Union,
}

impl fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Extension => "extension",
            Self::Restriction => "restriction",
            Self::List => "list",
            Self::Union => "union",
        };
        f.write_str(s)
    }
}

/// Set of derivation methods named by `block`, `final` and their defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DerivationSet {
    /// Blocks or finalizes extension
    pub extension: bool,
    /// Blocks or finalizes restriction
    pub restriction: bool,
    /// Blocks substitution group membership
    pub substitution: bool,
    /// Finalizes list derivation
    pub list: bool,
    /// Finalizes union derivation
    pub union: bool,
}

impl DerivationSet {
    /// Parse a `block`/`final` attribute value (`#all` or a token list)
    pub fn parse(value: &str) -> Result<Self> {
        let mut set = Self::default();
        for token in value.split_whitespace() {
            match token {
                "#all" => {
                    return Ok(Self {
                        extension: true,
                        restriction: true,
                        substitution: true,
                        list: true,
                        union: true,
                    })
                }
                "extension" => set.extension = true,
                "restriction" => set.restriction = true,
                "substitution" => set.substitution = true,
                "list" => set.list = true,
                "union" => set.union = true,
                other => {
                    return Err(Error::Value(format!(
                        "invalid derivation set token '{}'",
                        other
                    )))
                }
            }
        }
        Ok(set)
    }

    /// Check whether a derivation method is in the set
    pub fn contains(&self, method: DerivationMethod) -> bool {
        match method {
            DerivationMethod::Extension => self.extension,
            DerivationMethod::Restriction => self.restriction,
            DerivationMethod::List => self.list,
            DerivationMethod::Union => self.union,
        }
    }

    /// Union of two sets
    pub fn union_with(self, other: Self) -> Self {
        Self {
            extension: self.extension || other.extension,
            restriction: self.restriction || other.restriction,
            substitution: self.substitution || other.substitution,
            list: self.list || other.list,
            union: self.union || other.union,
        }
    }
}

/// Qualification form of local element and attribute names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Form {
    /// Local names are in the target namespace
    Qualified,
    /// Local names have no namespace
    #[default]
    Unqualified,
}

impl Form {
    /// Parse a `form`/`elementFormDefault` value
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "qualified" => Ok(Form::Qualified),
            "unqualified" => Ok(Form::Unqualified),
            other => Err(Error::Value(format!("invalid form value '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_mode_from_str() {
        assert_eq!(ValidationMode::from_str("lax").unwrap(), ValidationMode::Lax);
        assert!(ValidationMode::from_str("loose").is_err());
        assert_eq!(ValidationMode::default().to_string(), "strict");
    }

    #[test]
    fn test_validation_mode_deserialize() {
        let mode: ValidationMode = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(mode, ValidationMode::Skip);
    }

    #[test]
    fn test_derivation_set() {
        let set = DerivationSet::parse("extension substitution").unwrap();
        assert!(set.contains(DerivationMethod::Extension));
        assert!(!set.contains(DerivationMethod::Restriction));
        assert!(set.substitution);

        let all = DerivationSet::parse("#all").unwrap();
        assert!(all.contains(DerivationMethod::Restriction));
        assert!(all.contains(DerivationMethod::Union));

        assert!(DerivationSet::parse("bogus").is_err());
    }

    #[test]
    fn test_component_key_ordering() {
        let a = ComponentKey::new(ComponentCategory::Type, QName::local("b"));
        let b = ComponentKey::new(ComponentCategory::Element, QName::local("a"));
        assert!(a < b);
        assert_eq!(a.to_string(), "type b");
    }

    #[test]
    fn test_handles() {
        let t = TypeId::new(3);
        assert_eq!(t.index(), 3);
        assert!(TypeId::new(1) < t);
    }
}
