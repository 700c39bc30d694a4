//! XSD attribute declarations, attribute uses and attribute groups

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::namespaces::QName;

use super::base::{AttributeId, TypeId};
use super::values::SimpleValue;
use super::wildcards::Wildcard;

/// Attribute use mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Use {
    /// Attribute is optional (default)
    #[default]
    Optional,
    /// Attribute is required
    Required,
    /// Attribute is prohibited
    Prohibited,
}

impl Use {
    /// Parse from string value
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "optional" => Ok(Use::Optional),
            "required" => Ok(Use::Required),
            "prohibited" => Ok(Use::Prohibited),
            other => Err(Error::Value(format!(
                "Invalid attribute use value: '{}'. Must be 'optional', 'required', or 'prohibited'",
                other
            ))),
        }
    }

    /// Get the use as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Use::Optional => "optional",
            Use::Required => "required",
            Use::Prohibited => "prohibited",
        }
    }
}

impl std::fmt::Display for Use {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a value constraint supplies a default or pins the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueConstraintKind {
    /// `default="..."`
    Default,
    /// `fixed="..."`
    Fixed,
}

/// A default or fixed value on an element, attribute or attribute use
#[derive(Debug, Clone, PartialEq)]
pub struct ValueConstraint {
    /// Default or fixed
    pub kind: ValueConstraintKind,
    /// Lexical form as written in the schema
    pub lexical: String,
    /// Value in the declared type's value space, filled in once types resolve
    pub value: Option<SimpleValue>,
}

impl ValueConstraint {
    /// Read `default`/`fixed` attribute values; both at once is an error
    pub fn from_attrs(default: Option<&str>, fixed: Option<&str>) -> Result<Option<Self>> {
        match (default, fixed) {
            (Some(_), Some(_)) => Err(Error::Value(
                "'default' and 'fixed' attributes are mutually exclusive".to_string(),
            )),
            (Some(d), None) => Ok(Some(Self {
                kind: ValueConstraintKind::Default,
                lexical: d.to_string(),
                value: None,
            })),
            (None, Some(f)) => Ok(Some(Self {
                kind: ValueConstraintKind::Fixed,
                lexical: f.to_string(),
                value: None,
            })),
            (None, None) => Ok(None),
        }
    }

    /// Whether this is a fixed constraint
    pub fn is_fixed(&self) -> bool {
        self.kind == ValueConstraintKind::Fixed
    }

    /// Whether an instance value satisfies the constraint
    pub fn admits(&self, value: &SimpleValue) -> bool {
        match (&self.kind, &self.value) {
            (ValueConstraintKind::Default, _) => true,
            (ValueConstraintKind::Fixed, Some(fixed)) => fixed.value_eq(value),
            (ValueConstraintKind::Fixed, None) => value.to_lexical() == self.lexical,
        }
    }
}

/// An attribute declaration (global or local)
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    /// Attribute name
    pub name: QName,
    /// Simple type of the value
    pub type_id: TypeId,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
    /// Declared at the top level of a schema
    pub global: bool,
}

/// Attribute use inside a complex type or attribute group
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUse {
    /// The declaration used
    pub attribute: AttributeId,
    /// Required, optional or prohibited
    pub use_: Use,
    /// Value constraint of the use itself, overriding the declaration's
    pub value_constraint: Option<ValueConstraint>,
}

impl AttributeUse {
    /// Whether the attribute must be present
    pub fn is_required(&self) -> bool {
        self.use_ == Use::Required
    }

    /// Whether the attribute must be absent
    pub fn is_prohibited(&self) -> bool {
        self.use_ == Use::Prohibited
    }
}

/// A named attribute group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeGroupDef {
    /// Group name
    pub name: Option<QName>,
    /// Attribute uses keyed by attribute name
    pub uses: IndexMap<QName, AttributeUse>,
    /// Attribute wildcard
    pub wildcard: Option<Wildcard>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::values::AtomicValue;

    #[test]
    fn test_use_from_str() {
        assert_eq!(Use::from_str("required").unwrap(), Use::Required);
        assert_eq!(Use::from_str(" prohibited ").unwrap(), Use::Prohibited);
        assert!(Use::from_str("sometimes").is_err());
        assert_eq!(Use::default().to_string(), "optional");
    }

    #[test]
    fn test_value_constraint() {
        assert!(ValueConstraint::from_attrs(Some("a"), Some("b")).is_err());
        assert!(ValueConstraint::from_attrs(None, None).unwrap().is_none());

        let mut fixed = ValueConstraint::from_attrs(None, Some("1.0")).unwrap().unwrap();
        assert!(fixed.is_fixed());
        fixed.value = Some(SimpleValue::Atomic(AtomicValue::Decimal(
            rust_decimal::Decimal::ONE,
        )));
        assert!(fixed.admits(&SimpleValue::Atomic(AtomicValue::Decimal(
            "1.00".parse().unwrap()
        ))));
        assert!(!fixed.admits(&SimpleValue::Atomic(AtomicValue::Decimal(
            rust_decimal::Decimal::TWO
        ))));
    }
}
