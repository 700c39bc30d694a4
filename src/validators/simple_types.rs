//! XSD simple type definitions
//!
//! A simple type is one of three varieties:
//! - atomic: a primitive value space narrowed by facets
//! - list: whitespace-separated items of an atomic or union type
//! - union: the first member type that accepts the value wins
//!
//! Pattern facets match the lexical form as it appears in the instance.
//! The lexical rules of built-in types run on the whitespace-normalized form.
//!
//! See: https://www.w3.org/TR/xmlschema-2/

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{SchemaError, SchemaErrorKind, ValidationError};
use crate::names::{is_valid_name, is_valid_ncname, is_valid_nmtoken};
use crate::namespaces::{NamespaceContext, QName};

use super::base::{DerivationMethod, DerivationSet, TypeId};
use super::builtins::admitted_facets;
use super::facets::{Facet, FacetSet, FacetValues, WhiteSpace};
use super::values::{AtomicValue, Primitive, SimpleValue};

static LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());
static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\-+]?[0-9]+$").unwrap());
static DAY_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^YM]*(T.*)?$").unwrap());
static YEAR_MONTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^DT]*$").unwrap());

/// Lexical rules of built-in types, checked on the normalized value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalCheck {
    /// XML `Name` production
    Name,
    /// XML `NCName` production
    NcName,
    /// XML `Nmtoken` production
    NmToken,
    /// RFC 3066 language tag
    Language,
    /// Optional sign and digits
    Integer,
    /// Duration without year or month fields
    DayTimeDuration,
    /// Duration without day or time fields
    YearMonthDuration,
}

impl LexicalCheck {
    fn check(&self, value: &str) -> Result<(), ValidationError> {
        let (ok, production) = match self {
            LexicalCheck::Name => (is_valid_name(value), "Name"),
            LexicalCheck::NcName => (is_valid_ncname(value), "NCName"),
            LexicalCheck::NmToken => (is_valid_nmtoken(value), "NMTOKEN"),
            LexicalCheck::Language => (LANGUAGE_RE.is_match(value), "language"),
            LexicalCheck::Integer => (INTEGER_RE.is_match(value), "integer"),
            LexicalCheck::DayTimeDuration => (DAY_TIME_RE.is_match(value), "dayTimeDuration"),
            LexicalCheck::YearMonthDuration => {
                (YEAR_MONTH_RE.is_match(value), "yearMonthDuration")
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ValidationError::facet(format!(
                "'{}' is not a valid {}",
                value, production
            )))
        }
    }
}

/// Variety of a simple type
#[derive(Debug, Clone, PartialEq)]
pub enum Variety {
    /// Single value of a primitive value space
    Atomic(Primitive),
    /// Whitespace-separated list of item type values
    List(TypeId),
    /// Value of one of the member types, tried in order
    Union(Vec<TypeId>),
}

/// Access to simple type definitions by handle
///
/// Implemented by the finished component table and by the builder's
/// partially filled arena.
pub trait SimpleTypeLookup {
    /// Simple type behind a handle, if it is one
    fn simple_type(&self, id: TypeId) -> Option<&SimpleTypeDef>;
}

/// A simple type definition
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTypeDef {
    /// Name, absent for anonymous types
    pub name: Option<QName>,
    /// Base type (anyType for anySimpleType)
    pub base: Option<TypeId>,
    /// How the type was derived from its base
    pub derivation: DerivationMethod,
    /// Variety
    pub variety: Variety,
    /// Effective facets
    pub facets: FacetSet,
    /// Extra lexical check inherited from the built-in hierarchy
    pub lexical_check: Option<LexicalCheck>,
    /// Derivation methods disallowed for types derived from this one
    pub final_: DerivationSet,
    /// Whether this is a built-in type
    pub builtin: bool,
}

impl SimpleTypeDef {
    /// A primitive type
    pub fn primitive(name: QName, base: TypeId, primitive: Primitive) -> Self {
        Self {
            name: Some(name),
            base: Some(base),
            derivation: DerivationMethod::Restriction,
            variety: Variety::Atomic(primitive),
            facets: FacetSet {
                whitespace: Some(primitive.default_whitespace()),
                ..FacetSet::default()
            },
            lexical_check: None,
            final_: DerivationSet::default(),
            builtin: true,
        }
    }

    /// A list type over `item`
    pub fn list(name: Option<QName>, any_simple_type: TypeId, item: TypeId) -> Self {
        Self {
            name,
            base: Some(any_simple_type),
            derivation: DerivationMethod::List,
            variety: Variety::List(item),
            facets: FacetSet {
                whitespace: Some(WhiteSpace::Collapse),
                fixed: vec![(super::facets::FacetKind::WhiteSpace, "collapse".into())],
                ..FacetSet::default()
            },
            lexical_check: None,
            final_: DerivationSet::default(),
            builtin: false,
        }
    }

    /// A union type over `members`
    pub fn union(name: Option<QName>, any_simple_type: TypeId, members: Vec<TypeId>) -> Self {
        Self {
            name,
            base: Some(any_simple_type),
            derivation: DerivationMethod::Union,
            variety: Variety::Union(members),
            facets: FacetSet::default(),
            lexical_check: None,
            final_: DerivationSet::default(),
            builtin: false,
        }
    }

    /// Derive a type by restricting `base` with `facets`
    ///
    /// Facet values are interpreted in the base's value space; QName-valued
    /// enumerations need the namespace bindings of the defining schema.
    pub fn restrict(
        name: Option<QName>,
        base_id: TypeId,
        base: &SimpleTypeDef,
        facets: &[Facet],
        namespaces: Option<&NamespaceContext>,
        lookup: &dyn SimpleTypeLookup,
    ) -> Result<SimpleTypeDef, SchemaError> {
        if base.final_.restriction {
            return Err(SchemaError::new(
                SchemaErrorKind::InvalidRestriction,
                format!("base type {} is final for restriction", base.display_name()),
            ));
        }

        let parse = |lexical: &str| -> Result<AtomicValue, String> {
            match &base.variety {
                Variety::Atomic(p) => {
                    let normalized = base.whitespace().normalize(lexical);
                    p.parse(&normalized, namespaces)
                }
                _ => Err("range facets need an atomic base type".to_string()),
            }
        };
        let validate = |lexical: &str| -> Result<SimpleValue, String> {
            base.validate(lookup, lexical, namespaces)
                .map_err(|e| e.message)
        };
        let values = FacetValues {
            parse: &parse,
            validate: &validate,
        };
        let facets = FacetSet::derive(&base.facets, facets, admitted_facets(&base.variety), &values)?;

        Ok(SimpleTypeDef {
            name,
            base: Some(base_id),
            derivation: DerivationMethod::Restriction,
            variety: base.variety.clone(),
            facets,
            lexical_check: base.lexical_check,
            final_: DerivationSet::default(),
            builtin: false,
        })
    }

    /// Name for messages
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => "anonymous simple type".to_string(),
        }
    }

    /// Effective whiteSpace handling
    pub fn whitespace(&self) -> WhiteSpace {
        match (&self.facets.whitespace, &self.variety) {
            (Some(ws), _) => *ws,
            (None, Variety::Atomic(p)) => p.default_whitespace(),
            (None, _) => WhiteSpace::Collapse,
        }
    }

    /// Whether values of this type are QNames and need namespace bindings
    pub fn needs_namespaces(&self, lookup: &dyn SimpleTypeLookup) -> bool {
        match &self.variety {
            Variety::Atomic(p) => matches!(p, Primitive::QName | Primitive::Notation),
            Variety::List(item) => lookup
                .simple_type(*item)
                .is_some_and(|t| t.needs_namespaces(lookup)),
            Variety::Union(members) => members.iter().any(|m| {
                lookup
                    .simple_type(*m)
                    .is_some_and(|t| t.needs_namespaces(lookup))
            }),
        }
    }

    /// Validate a lexical value and map it to the value space
    ///
    /// Checks run in a fixed order: whitespace, lexical parse, length,
    /// range, digits, pattern, enumeration.
    pub fn validate(
        &self,
        lookup: &dyn SimpleTypeLookup,
        lexical: &str,
        namespaces: Option<&NamespaceContext>,
    ) -> Result<SimpleValue, ValidationError> {
        match &self.variety {
            Variety::Atomic(primitive) => {
                let normalized = self.whitespace().normalize(lexical);
                if let Some(check) = &self.lexical_check {
                    check.check(&normalized)?;
                }
                let value = primitive.parse(&normalized, namespaces).map_err(|reason| {
                    ValidationError::facet(format!(
                        "'{}' is not a valid value of {}",
                        normalized,
                        self.display_name()
                    ))
                    .with_reason(reason)
                })?;
                if !matches!(primitive, Primitive::QName | Primitive::Notation) {
                    if let Some(length) = value.length() {
                        self.facets.check_length(length)?;
                    }
                }
                self.facets.check_range(&value)?;
                self.facets.check_digits(&value)?;
                self.facets.check_timezone(&value)?;
                self.facets.check_patterns(lexical)?;
                let value = SimpleValue::Atomic(value);
                self.facets.check_enumeration(&value)?;
                Ok(value)
            }
            Variety::List(item) => {
                let item_type = self.resolve(lookup, *item)?;
                let normalized = WhiteSpace::Collapse.normalize(lexical);
                let items = normalized
                    .split(' ')
                    .filter(|token| !token.is_empty())
                    .map(|token| item_type.validate(lookup, token, namespaces))
                    .collect::<Result<Vec<_>, _>>()?;
                self.facets.check_length(items.len())?;
                self.facets.check_patterns(lexical)?;
                let value = SimpleValue::List(items);
                self.facets.check_enumeration(&value)?;
                Ok(value)
            }
            Variety::Union(members) => {
                let mut reasons = Vec::new();
                let mut matched = None;
                for member in members {
                    let member_type = self.resolve(lookup, *member)?;
                    match member_type.validate(lookup, lexical, namespaces) {
                        Ok(value) => {
                            matched = Some(SimpleValue::Union {
                                member: *member,
                                value: Box::new(value),
                            });
                            break;
                        }
                        Err(e) => reasons.push(e.message),
                    }
                }
                let value = matched.ok_or_else(|| {
                    ValidationError::facet(format!(
                        "'{}' is not valid for any member of {}",
                        lexical.trim(),
                        self.display_name()
                    ))
                    .with_reason(reasons.join("; "))
                })?;
                self.facets.check_patterns(lexical)?;
                self.facets.check_enumeration(&value)?;
                Ok(value)
            }
        }
    }

    fn resolve<'a>(
        &self,
        lookup: &'a dyn SimpleTypeLookup,
        id: TypeId,
    ) -> Result<&'a SimpleTypeDef, ValidationError> {
        lookup.simple_type(id).ok_or_else(|| {
            ValidationError::facet(format!(
                "{} refers to a type that is not a simple type",
                self.display_name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::facets::FacetKind;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Arena(HashMap<TypeId, SimpleTypeDef>);

    impl SimpleTypeLookup for Arena {
        fn simple_type(&self, id: TypeId) -> Option<&SimpleTypeDef> {
            self.0.get(&id)
        }
    }

    fn arena() -> Arena {
        let mut arena = Arena::default();
        arena.0.insert(
            TypeId::new(1),
            SimpleTypeDef::primitive(QName::xsd("anySimpleType"), TypeId::new(0), Primitive::AnySimple),
        );
        arena.0.insert(
            TypeId::new(2),
            SimpleTypeDef::primitive(QName::xsd("decimal"), TypeId::new(1), Primitive::Decimal),
        );
        arena.0.insert(
            TypeId::new(3),
            SimpleTypeDef::primitive(QName::xsd("boolean"), TypeId::new(1), Primitive::Boolean),
        );
        arena
    }

    #[test]
    fn test_restriction_and_tightening() {
        let arena = arena();
        let decimal = arena.simple_type(TypeId::new(2)).unwrap();
        let percent = SimpleTypeDef::restrict(
            Some(QName::local("percent")),
            TypeId::new(2),
            decimal,
            &[
                Facet::new(FacetKind::MinInclusive, "0"),
                Facet::new(FacetKind::MaxInclusive, "100"),
            ],
            None,
            &arena,
        )
        .unwrap();
        assert!(percent.validate(&arena, " 42.5 ", None).is_ok());
        assert!(percent.validate(&arena, "101", None).is_err());
        assert!(percent.validate(&arena, "abc", None).is_err());

        let loosened = SimpleTypeDef::restrict(
            None,
            TypeId::new(4),
            &percent,
            &[Facet::new(FacetKind::MaxInclusive, "200")],
            None,
            &arena,
        );
        assert_eq!(
            loosened.unwrap_err().kind,
            SchemaErrorKind::InvalidFacetDerivation
        );
    }

    #[test]
    fn test_pattern_sees_the_unnormalized_value() {
        let arena = arena();
        let string =
            SimpleTypeDef::primitive(QName::xsd("string"), TypeId::new(1), Primitive::String);
        let token = SimpleTypeDef::restrict(
            Some(QName::local("tok")),
            TypeId::new(6),
            &string,
            &[Facet::new(FacetKind::WhiteSpace, "collapse")],
            None,
            &arena,
        )
        .unwrap();
        let pair = SimpleTypeDef::restrict(
            None,
            TypeId::new(7),
            &token,
            &[Facet::new(FacetKind::Pattern, "a b")],
            None,
            &arena,
        )
        .unwrap();
        assert_eq!(pair.validate(&arena, "a b", None).unwrap().to_lexical(), "a b");
        assert!(pair.validate(&arena, "  a   b ", None).is_err());
        assert!(token.validate(&arena, "  a   b ", None).is_ok());
    }

    #[test]
    fn test_enumeration_value_must_be_valid_for_base() {
        let arena = arena();
        let decimal = arena.simple_type(TypeId::new(2)).unwrap();
        let err = SimpleTypeDef::restrict(
            None,
            TypeId::new(2),
            decimal,
            &[Facet::new(FacetKind::Enumeration, "high")],
            None,
            &arena,
        )
        .unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::InvalidFacetDerivation);
    }

    #[test]
    fn test_list_type() {
        let arena = arena();
        let list = SimpleTypeDef::list(None, TypeId::new(1), TypeId::new(2));
        let value = list.validate(&arena, " 1  2.5\n3 ", None).unwrap();
        assert_eq!(value.to_lexical(), "1 2.5 3");
        assert!(list.validate(&arena, "1 x", None).is_err());

        let short = SimpleTypeDef::restrict(
            None,
            TypeId::new(5),
            &list,
            &[Facet::new(FacetKind::MaxLength, "2")],
            None,
            &arena,
        )
        .unwrap();
        assert!(short.validate(&arena, "1 2", None).is_ok());
        assert!(short.validate(&arena, "1 2 3", None).is_err());
    }

    #[test]
    fn test_union_type_records_member() {
        let arena = arena();
        let union = SimpleTypeDef::union(None, TypeId::new(1), vec![TypeId::new(3), TypeId::new(2)]);
        match union.validate(&arena, "1", None).unwrap() {
            SimpleValue::Union { member, .. } => assert_eq!(member, TypeId::new(3)),
            other => panic!("unexpected value {:?}", other),
        }
        match union.validate(&arena, "2", None).unwrap() {
            SimpleValue::Union { member, .. } => assert_eq!(member, TypeId::new(2)),
            other => panic!("unexpected value {:?}", other),
        }
        assert!(union.validate(&arena, "maybe", None).is_err());
    }

    #[test]
    fn test_final_restriction() {
        let arena = arena();
        let mut decimal = arena.simple_type(TypeId::new(2)).unwrap().clone();
        decimal.final_.restriction = true;
        let err = SimpleTypeDef::restrict(None, TypeId::new(2), &decimal, &[], None, &arena)
            .unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::InvalidRestriction);
    }
}
