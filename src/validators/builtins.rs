//! XSD built-in types
//!
//! Built-in simple types are ordinary [`SimpleTypeDef`]s: every derived
//! built-in is a restriction of its base expressed with facets, so
//! `xs:byte` is `xs:short` with two range facets and `xs:integer` is
//! `xs:decimal` with `fractionDigits="0"`. User types derived from them go
//! through exactly the same facet machinery.

use std::collections::HashSet;

use crate::error::SchemaError;
use crate::namespaces::QName;

use super::base::TypeId;
use super::builders::XsdVersion;
use super::facets::{Facet, FacetKind};
use super::simple_types::{LexicalCheck, SimpleTypeDef, SimpleTypeLookup, Variety};
use super::values::Primitive;

use FacetKind::{
    ExplicitTimezone, FractionDigits, MaxInclusive, MinInclusive, WhiteSpace as Ws,
};

// =============================================================================
// Type names
// =============================================================================

/// XSD anyType type name
pub const XSD_ANY_TYPE: &str = "anyType";
/// XSD anySimpleType type name
pub const XSD_ANY_SIMPLE_TYPE: &str = "anySimpleType";
/// XSD anyAtomicType type name (XSD 1.1)
pub const XSD_ANY_ATOMIC_TYPE: &str = "anyAtomicType";

/// XSD string type name
pub const XSD_STRING: &str = "string";
/// XSD normalizedString type name
pub const XSD_NORMALIZED_STRING: &str = "normalizedString";
/// XSD token type name
pub const XSD_TOKEN: &str = "token";
/// XSD language type name
pub const XSD_LANGUAGE: &str = "language";
/// XSD Name type name
pub const XSD_NAME: &str = "Name";
/// XSD NCName type name
pub const XSD_NCNAME: &str = "NCName";
/// XSD ID type name
pub const XSD_ID: &str = "ID";
/// XSD IDREF type name
pub const XSD_IDREF: &str = "IDREF";
/// XSD IDREFS type name
pub const XSD_IDREFS: &str = "IDREFS";
/// XSD ENTITY type name
pub const XSD_ENTITY: &str = "ENTITY";
/// XSD ENTITIES type name
pub const XSD_ENTITIES: &str = "ENTITIES";
/// XSD NMTOKEN type name
pub const XSD_NMTOKEN: &str = "NMTOKEN";
/// XSD NMTOKENS type name
pub const XSD_NMTOKENS: &str = "NMTOKENS";

/// XSD boolean type name
pub const XSD_BOOLEAN: &str = "boolean";

/// XSD decimal type name
pub const XSD_DECIMAL: &str = "decimal";
/// XSD integer type name
pub const XSD_INTEGER: &str = "integer";
/// XSD nonPositiveInteger type name
pub const XSD_NON_POSITIVE_INTEGER: &str = "nonPositiveInteger";
/// XSD negativeInteger type name
pub const XSD_NEGATIVE_INTEGER: &str = "negativeInteger";
/// XSD long type name
pub const XSD_LONG: &str = "long";
/// XSD int type name
pub const XSD_INT: &str = "int";
/// XSD short type name
pub const XSD_SHORT: &str = "short";
/// XSD byte type name
pub const XSD_BYTE: &str = "byte";
/// XSD nonNegativeInteger type name
pub const XSD_NON_NEGATIVE_INTEGER: &str = "nonNegativeInteger";
/// XSD unsignedLong type name
pub const XSD_UNSIGNED_LONG: &str = "unsignedLong";
/// XSD unsignedInt type name
pub const XSD_UNSIGNED_INT: &str = "unsignedInt";
/// XSD unsignedShort type name
pub const XSD_UNSIGNED_SHORT: &str = "unsignedShort";
/// XSD unsignedByte type name
pub const XSD_UNSIGNED_BYTE: &str = "unsignedByte";
/// XSD positiveInteger type name
pub const XSD_POSITIVE_INTEGER: &str = "positiveInteger";

/// XSD float type name
pub const XSD_FLOAT: &str = "float";
/// XSD double type name
pub const XSD_DOUBLE: &str = "double";

/// XSD duration type name
pub const XSD_DURATION: &str = "duration";
/// XSD dayTimeDuration type name (XSD 1.1)
pub const XSD_DAY_TIME_DURATION: &str = "dayTimeDuration";
/// XSD yearMonthDuration type name (XSD 1.1)
pub const XSD_YEAR_MONTH_DURATION: &str = "yearMonthDuration";
/// XSD dateTime type name
pub const XSD_DATETIME: &str = "dateTime";
/// XSD dateTimeStamp type name (XSD 1.1)
pub const XSD_DATETIME_STAMP: &str = "dateTimeStamp";
/// XSD time type name
pub const XSD_TIME: &str = "time";
/// XSD date type name
pub const XSD_DATE: &str = "date";
/// XSD gYearMonth type name
pub const XSD_GYEAR_MONTH: &str = "gYearMonth";
/// XSD gYear type name
pub const XSD_GYEAR: &str = "gYear";
/// XSD gMonthDay type name
pub const XSD_GMONTH_DAY: &str = "gMonthDay";
/// XSD gDay type name
pub const XSD_GDAY: &str = "gDay";
/// XSD gMonth type name
pub const XSD_GMONTH: &str = "gMonth";

/// XSD hexBinary type name
pub const XSD_HEX_BINARY: &str = "hexBinary";
/// XSD base64Binary type name
pub const XSD_BASE64_BINARY: &str = "base64Binary";
/// XSD anyURI type name
pub const XSD_ANY_URI: &str = "anyURI";
/// XSD QName type name
pub const XSD_QNAME: &str = "QName";
/// XSD NOTATION type name
pub const XSD_NOTATION: &str = "NOTATION";

// =============================================================================
// Admitted Facets Sets
// =============================================================================

lazy_static::lazy_static! {
    /// Facets admitted for string-like and binary types
    pub static ref STRING_FACETS: HashSet<FacetKind> = {
        let mut s = HashSet::new();
        s.insert(FacetKind::Length);
        s.insert(FacetKind::MinLength);
        s.insert(FacetKind::MaxLength);
        s.insert(FacetKind::Pattern);
        s.insert(FacetKind::Enumeration);
        s.insert(FacetKind::WhiteSpace);
        s
    };

    /// Facets admitted for boolean type
    pub static ref BOOLEAN_FACETS: HashSet<FacetKind> = {
        let mut s = HashSet::new();
        s.insert(FacetKind::Pattern);
        s.insert(FacetKind::WhiteSpace);
        s
    };

    /// Facets admitted for float, double and duration types
    pub static ref ORDERED_FACETS: HashSet<FacetKind> = {
        let mut s = HashSet::new();
        s.insert(FacetKind::Pattern);
        s.insert(FacetKind::Enumeration);
        s.insert(FacetKind::WhiteSpace);
        s.insert(FacetKind::MaxInclusive);
        s.insert(FacetKind::MaxExclusive);
        s.insert(FacetKind::MinInclusive);
        s.insert(FacetKind::MinExclusive);
        s
    };

    /// Facets admitted for decimal types
    pub static ref DECIMAL_FACETS: HashSet<FacetKind> = {
        let mut s = ORDERED_FACETS.clone();
        s.insert(FacetKind::TotalDigits);
        s.insert(FacetKind::FractionDigits);
        s
    };

    /// Facets admitted for date and time types
    pub static ref DATETIME_FACETS: HashSet<FacetKind> = {
        let mut s = ORDERED_FACETS.clone();
        s.insert(FacetKind::ExplicitTimezone);
        s
    };

    /// Facets admitted for list types
    pub static ref LIST_FACETS: HashSet<FacetKind> = {
        STRING_FACETS.clone()
    };

    /// Facets admitted for union types
    pub static ref UNION_FACETS: HashSet<FacetKind> = {
        let mut s = HashSet::new();
        s.insert(FacetKind::Pattern);
        s.insert(FacetKind::Enumeration);
        s
    };

    /// Facets admitted when restricting anySimpleType directly
    pub static ref ANY_SIMPLE_FACETS: HashSet<FacetKind> = {
        let mut s = HashSet::new();
        s.insert(FacetKind::Pattern);
        s.insert(FacetKind::Enumeration);
        s.insert(FacetKind::WhiteSpace);
        s
    };
}

/// Facets admitted for a simple type variety
pub fn admitted_facets(variety: &Variety) -> &'static HashSet<FacetKind> {
    match variety {
        Variety::List(_) => &LIST_FACETS,
        Variety::Union(_) => &UNION_FACETS,
        Variety::Atomic(primitive) => match primitive {
            Primitive::AnySimple => &ANY_SIMPLE_FACETS,
            Primitive::String
            | Primitive::HexBinary
            | Primitive::Base64Binary
            | Primitive::AnyUri
            | Primitive::QName
            | Primitive::Notation => &STRING_FACETS,
            Primitive::Boolean => &BOOLEAN_FACETS,
            Primitive::Decimal => &DECIMAL_FACETS,
            Primitive::Float | Primitive::Double | Primitive::Duration => &ORDERED_FACETS,
            Primitive::DateTime
            | Primitive::Time
            | Primitive::Date
            | Primitive::GYearMonth
            | Primitive::GYear
            | Primitive::GMonthDay
            | Primitive::GDay
            | Primitive::GMonth => &DATETIME_FACETS,
        },
    }
}

// =============================================================================
// Built-in Type Registry
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum BuiltinKind {
    Primitive(Primitive),
    Restriction {
        base: &'static str,
        facets: &'static [(FacetKind, &'static str)],
        check: Option<LexicalCheck>,
    },
    List {
        item: &'static str,
        facets: &'static [(FacetKind, &'static str)],
    },
}

#[derive(Debug, Clone, Copy)]
struct BuiltinSpec {
    name: &'static str,
    kind: BuiltinKind,
    xsd11: bool,
}

const fn primitive(name: &'static str, primitive: Primitive) -> BuiltinSpec {
    BuiltinSpec {
        name,
        kind: BuiltinKind::Primitive(primitive),
        xsd11: false,
    }
}

const fn restriction(
    name: &'static str,
    base: &'static str,
    facets: &'static [(FacetKind, &'static str)],
) -> BuiltinSpec {
    BuiltinSpec {
        name,
        kind: BuiltinKind::Restriction {
            base,
            facets,
            check: None,
        },
        xsd11: false,
    }
}

const fn checked(name: &'static str, base: &'static str, check: LexicalCheck) -> BuiltinSpec {
    checked_with(name, base, &[], check)
}

const fn checked_with(
    name: &'static str,
    base: &'static str,
    facets: &'static [(FacetKind, &'static str)],
    check: LexicalCheck,
) -> BuiltinSpec {
    BuiltinSpec {
        name,
        kind: BuiltinKind::Restriction {
            base,
            facets,
            check: Some(check),
        },
        xsd11: false,
    }
}

const fn list(name: &'static str, item: &'static str) -> BuiltinSpec {
    BuiltinSpec {
        name,
        kind: BuiltinKind::List {
            item,
            facets: &[(FacetKind::MinLength, "1")],
        },
        xsd11: false,
    }
}

const fn xsd11(mut spec: BuiltinSpec) -> BuiltinSpec {
    spec.xsd11 = true;
    spec
}

/// Built-in simple types, every base listed before its derived types
const BUILTINS: &[BuiltinSpec] = &[
    primitive(XSD_ANY_SIMPLE_TYPE, Primitive::AnySimple),
    xsd11(restriction(XSD_ANY_ATOMIC_TYPE, XSD_ANY_SIMPLE_TYPE, &[])),
    primitive(XSD_STRING, Primitive::String),
    restriction(XSD_NORMALIZED_STRING, XSD_STRING, &[(Ws, "replace")]),
    restriction(XSD_TOKEN, XSD_NORMALIZED_STRING, &[(Ws, "collapse")]),
    checked(XSD_LANGUAGE, XSD_TOKEN, LexicalCheck::Language),
    checked(XSD_NMTOKEN, XSD_TOKEN, LexicalCheck::NmToken),
    list(XSD_NMTOKENS, XSD_NMTOKEN),
    checked(XSD_NAME, XSD_TOKEN, LexicalCheck::Name),
    checked(XSD_NCNAME, XSD_NAME, LexicalCheck::NcName),
    restriction(XSD_ID, XSD_NCNAME, &[]),
    restriction(XSD_IDREF, XSD_NCNAME, &[]),
    list(XSD_IDREFS, XSD_IDREF),
    restriction(XSD_ENTITY, XSD_NCNAME, &[]),
    list(XSD_ENTITIES, XSD_ENTITY),
    primitive(XSD_BOOLEAN, Primitive::Boolean),
    primitive(XSD_DECIMAL, Primitive::Decimal),
    checked_with(
        XSD_INTEGER,
        XSD_DECIMAL,
        &[(FractionDigits, "0")],
        LexicalCheck::Integer,
    ),
    restriction(XSD_NON_POSITIVE_INTEGER, XSD_INTEGER, &[(MaxInclusive, "0")]),
    restriction(XSD_NEGATIVE_INTEGER, XSD_NON_POSITIVE_INTEGER, &[(MaxInclusive, "-1")]),
    restriction(
        XSD_LONG,
        XSD_INTEGER,
        &[
            (MinInclusive, "-9223372036854775808"),
            (MaxInclusive, "9223372036854775807"),
        ],
    ),
    restriction(
        XSD_INT,
        XSD_LONG,
        &[(MinInclusive, "-2147483648"), (MaxInclusive, "2147483647")],
    ),
    restriction(
        XSD_SHORT,
        XSD_INT,
        &[(MinInclusive, "-32768"), (MaxInclusive, "32767")],
    ),
    restriction(XSD_BYTE, XSD_SHORT, &[(MinInclusive, "-128"), (MaxInclusive, "127")]),
    restriction(XSD_NON_NEGATIVE_INTEGER, XSD_INTEGER, &[(MinInclusive, "0")]),
    restriction(
        XSD_UNSIGNED_LONG,
        XSD_NON_NEGATIVE_INTEGER,
        &[(MaxInclusive, "18446744073709551615")],
    ),
    restriction(XSD_UNSIGNED_INT, XSD_UNSIGNED_LONG, &[(MaxInclusive, "4294967295")]),
    restriction(XSD_UNSIGNED_SHORT, XSD_UNSIGNED_INT, &[(MaxInclusive, "65535")]),
    restriction(XSD_UNSIGNED_BYTE, XSD_UNSIGNED_SHORT, &[(MaxInclusive, "255")]),
    restriction(XSD_POSITIVE_INTEGER, XSD_NON_NEGATIVE_INTEGER, &[(MinInclusive, "1")]),
    primitive(XSD_FLOAT, Primitive::Float),
    primitive(XSD_DOUBLE, Primitive::Double),
    primitive(XSD_DURATION, Primitive::Duration),
    xsd11(checked(
        XSD_DAY_TIME_DURATION,
        XSD_DURATION,
        LexicalCheck::DayTimeDuration,
    )),
    xsd11(checked(
        XSD_YEAR_MONTH_DURATION,
        XSD_DURATION,
        LexicalCheck::YearMonthDuration,
    )),
    primitive(XSD_DATETIME, Primitive::DateTime),
    xsd11(restriction(
        XSD_DATETIME_STAMP,
        XSD_DATETIME,
        &[(ExplicitTimezone, "required")],
    )),
    primitive(XSD_TIME, Primitive::Time),
    primitive(XSD_DATE, Primitive::Date),
    primitive(XSD_GYEAR_MONTH, Primitive::GYearMonth),
    primitive(XSD_GYEAR, Primitive::GYear),
    primitive(XSD_GMONTH_DAY, Primitive::GMonthDay),
    primitive(XSD_GDAY, Primitive::GDay),
    primitive(XSD_GMONTH, Primitive::GMonth),
    primitive(XSD_HEX_BINARY, Primitive::HexBinary),
    primitive(XSD_BASE64_BINARY, Primitive::Base64Binary),
    primitive(XSD_ANY_URI, Primitive::AnyUri),
    primitive(XSD_QNAME, Primitive::QName),
    primitive(XSD_NOTATION, Primitive::Notation),
];

/// Names of the built-in simple types available in a language version
pub fn builtin_names(version: XsdVersion) -> impl Iterator<Item = &'static str> {
    BUILTINS
        .iter()
        .filter(move |spec| !spec.xsd11 || version == XsdVersion::V11)
        .map(|spec| spec.name)
}

/// Arena slice of already-built built-ins, offset past anyType
struct BuiltinArena<'a> {
    defs: &'a [SimpleTypeDef],
    offset: usize,
}

impl SimpleTypeLookup for BuiltinArena<'_> {
    fn simple_type(&self, id: TypeId) -> Option<&SimpleTypeDef> {
        id.index()
            .checked_sub(self.offset)
            .and_then(|i| self.defs.get(i))
    }
}

/// Build the built-in simple types
///
/// The returned definitions occupy consecutive type slots starting at
/// `offset`; `any_type` is the handle of `xs:anyType`.
pub(crate) fn builtin_types(
    version: XsdVersion,
    any_type: TypeId,
    offset: usize,
) -> Result<Vec<SimpleTypeDef>, SchemaError> {
    let mut defs: Vec<SimpleTypeDef> = Vec::new();
    let mut ids: Vec<(&'static str, TypeId)> = Vec::new();
    let lookup_id = |ids: &[(&'static str, TypeId)], name: &str| {
        ids.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
    };

    for spec in BUILTINS {
        if spec.xsd11 && version != XsdVersion::V11 {
            continue;
        }
        let name = QName::xsd(spec.name);
        let def = match spec.kind {
            BuiltinKind::Primitive(p) => {
                let base = if p == Primitive::AnySimple {
                    any_type
                } else {
                    lookup_id(&ids, XSD_ANY_SIMPLE_TYPE).unwrap_or(any_type)
                };
                SimpleTypeDef::primitive(name, base, p)
            }
            BuiltinKind::Restriction {
                base,
                facets,
                check,
            } => {
                let base_id = lookup_id(&ids, base).ok_or_else(|| missing_base(spec.name))?;
                let arena = BuiltinArena {
                    defs: &defs,
                    offset,
                };
                let base_def = arena
                    .simple_type(base_id)
                    .ok_or_else(|| missing_base(spec.name))?;
                let raw: Vec<Facet> = facets.iter().map(|(k, v)| Facet::new(*k, *v)).collect();
                let mut def =
                    SimpleTypeDef::restrict(Some(name), base_id, base_def, &raw, None, &arena)?;
                if check.is_some() {
                    def.lexical_check = check;
                }
                def
            }
            BuiltinKind::List { item, facets } => {
                let item_id = lookup_id(&ids, item).ok_or_else(|| missing_base(spec.name))?;
                let any_simple =
                    lookup_id(&ids, XSD_ANY_SIMPLE_TYPE).ok_or_else(|| missing_base(spec.name))?;
                let mut def = SimpleTypeDef::list(Some(name), any_simple, item_id);
                for (kind, value) in facets {
                    if *kind == FacetKind::MinLength {
                        def.facets.min_length = value.parse().ok();
                    }
                }
                def
            }
        };
        let mut def = def;
        def.builtin = true;
        ids.push((spec.name, TypeId::new(offset + defs.len())));
        defs.push(def);
    }
    Ok(defs)
}

fn missing_base(name: &str) -> SchemaError {
    SchemaError::new(
        crate::error::SchemaErrorKind::UnresolvableDerivation,
        format!("built-in type {} has no base", name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::values::{AtomicValue, SimpleValue};

    fn builtins() -> Vec<SimpleTypeDef> {
        builtin_types(XsdVersion::V11, TypeId::new(0), 1).unwrap()
    }

    fn validate(defs: &[SimpleTypeDef], name: &str, value: &str) -> bool {
        let arena = BuiltinArena { defs, offset: 1 };
        let def = defs
            .iter()
            .find(|d| d.name.as_ref().map(|n| n.local_name.as_str()) == Some(name))
            .unwrap();
        def.validate(&arena, value, None).is_ok()
    }

    #[test]
    fn test_builtin_order() {
        let defs = builtins();
        let names: Vec<_> = builtin_names(XsdVersion::V11).collect();
        assert_eq!(defs.len(), names.len());
        assert!(builtin_names(XsdVersion::V10).all(|n| n != XSD_DATETIME_STAMP));
    }

    #[test]
    fn test_integer_types() {
        let defs = builtins();
        assert!(validate(&defs, XSD_INTEGER, "-42"));
        assert!(validate(&defs, XSD_INTEGER, "\t+42 \n"));
        assert!(!validate(&defs, XSD_INTEGER, "4.2"));
        assert!(!validate(&defs, XSD_INTEGER, "1."));
        assert!(validate(&defs, XSD_BYTE, "127"));
        assert!(!validate(&defs, XSD_BYTE, "128"));
        assert!(validate(&defs, XSD_UNSIGNED_LONG, "18446744073709551615"));
        assert!(!validate(&defs, XSD_UNSIGNED_LONG, "-1"));
        assert!(!validate(&defs, XSD_POSITIVE_INTEGER, "0"));
        assert!(validate(&defs, XSD_NEGATIVE_INTEGER, "-1"));
    }

    #[test]
    fn test_string_types() {
        let defs = builtins();
        assert!(validate(&defs, XSD_TOKEN, "  Hello   World "));
        assert!(validate(&defs, XSD_NCNAME, "validName"));
        assert!(!validate(&defs, XSD_NCNAME, "invalid:name"));
        assert!(validate(&defs, XSD_NAME, "a:b"));
        assert!(validate(&defs, XSD_LANGUAGE, "en-US"));
        assert!(!validate(&defs, XSD_LANGUAGE, "toolonglanguage"));
        assert!(validate(&defs, XSD_LANGUAGE, " en-GB "));
        assert!(validate(&defs, XSD_NMTOKENS, "a b c"));
        assert!(!validate(&defs, XSD_NMTOKENS, "   "));
    }

    #[test]
    fn test_xsd11_types() {
        let defs = builtins();
        assert!(validate(&defs, XSD_DATETIME_STAMP, "2020-01-01T00:00:00Z"));
        assert!(!validate(&defs, XSD_DATETIME_STAMP, "2020-01-01T00:00:00"));
        assert!(validate(&defs, XSD_DAY_TIME_DURATION, "P1DT2H"));
        assert!(!validate(&defs, XSD_DAY_TIME_DURATION, "P1M"));
        assert!(validate(&defs, XSD_YEAR_MONTH_DURATION, "P1Y2M"));
        assert!(!validate(&defs, XSD_YEAR_MONTH_DURATION, "P1D"));
    }

    #[test]
    fn test_token_value_is_collapsed() {
        let defs = builtins();
        let arena = BuiltinArena {
            defs: &defs,
            offset: 1,
        };
        let token = defs
            .iter()
            .find(|d| d.name == Some(QName::xsd(XSD_TOKEN)))
            .unwrap();
        let value = token.validate(&arena, " a \n b ", None).unwrap();
        assert_eq!(value, SimpleValue::Atomic(AtomicValue::String("a b".into())));
    }
}
