//! The global component table
//!
//! [`ComponentTable`] is the single owner of every compiled component.
//! Components live in one arena per kind and link to each other through
//! typed handles; top-level names map to handles through one ordered index
//! keyed by `(category, name)`. A finished table is never mutated, so it is
//! shared freely between concurrent validations.

use std::collections::BTreeMap;

use crate::namespaces::QName;

use super::attributes::{AttributeDecl, AttributeGroupDef};
use super::base::{
    AttributeGroupId, AttributeId, ComponentCategory, ComponentKey, DerivationMethod,
    DerivationSet, ElementId, GroupId, IdentityId, TypeId,
};
use super::builders::XsdVersion;
use super::complex_types::ComplexTypeDef;
use super::elements::ElementDecl;
use super::groups::GroupDef;
use super::identities::IdentityConstraint;
use super::simple_types::{SimpleTypeDef, SimpleTypeLookup};

/// A type definition
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    /// Simple type definition
    Simple(SimpleTypeDef),
    /// Complex type definition
    Complex(ComplexTypeDef),
}

impl TypeDef {
    /// Type name, absent for anonymous types
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(t) => t.name.as_ref(),
            TypeDef::Complex(t) => t.name.as_ref(),
        }
    }

    /// Name for messages
    pub fn display_name(&self) -> String {
        match self {
            TypeDef::Simple(t) => t.display_name(),
            TypeDef::Complex(t) => t.display_name(),
        }
    }

    /// Base type and derivation method; `None` for anyType
    pub fn derivation(&self) -> Option<(TypeId, DerivationMethod)> {
        match self {
            TypeDef::Simple(t) => t.base.map(|b| (b, t.derivation)),
            TypeDef::Complex(t) => Some((t.base, t.derivation)),
        }
    }

    /// Derivation methods finalized on this type
    pub fn final_set(&self) -> DerivationSet {
        match self {
            TypeDef::Simple(t) => t.final_,
            TypeDef::Complex(t) => t.final_,
        }
    }

    /// Derivation methods blocked for `xsi:type` substitution
    pub fn block_set(&self) -> DerivationSet {
        match self {
            TypeDef::Simple(_) => DerivationSet::default(),
            TypeDef::Complex(t) => t.block,
        }
    }

    /// Simple type definition, if this is one
    pub fn as_simple(&self) -> Option<&SimpleTypeDef> {
        match self {
            TypeDef::Simple(t) => Some(t),
            _ => None,
        }
    }

    /// Complex type definition, if this is one
    pub fn as_complex(&self) -> Option<&ComplexTypeDef> {
        match self {
            TypeDef::Complex(t) => Some(t),
            _ => None,
        }
    }

    /// Whether this is a simple type
    pub fn is_simple(&self) -> bool {
        matches!(self, TypeDef::Simple(_))
    }
}

/// Handle of a top-level component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRef {
    /// Type definition
    Type(TypeId),
    /// Element declaration
    Element(ElementId),
    /// Attribute declaration
    Attribute(AttributeId),
    /// Model group definition
    Group(GroupId),
    /// Attribute group definition
    AttributeGroup(AttributeGroupId),
    /// Identity constraint
    Identity(IdentityId),
    /// Notation declaration
    Notation,
}

/// A notation declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    /// Notation name
    pub name: QName,
    /// Public identifier
    pub public: Option<String>,
    /// System identifier
    pub system: Option<String>,
}

/// Handle of `xs:anyType`; it always occupies the first type slot
pub const ANY_TYPE: TypeId = TypeId(0);
/// Handle of `xs:anySimpleType`; it always occupies the second type slot
pub const ANY_SIMPLE_TYPE: TypeId = TypeId(1);

/// The closed, immutable graph of compiled schema components
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTable {
    pub(crate) version: XsdVersion,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) groups: Vec<GroupDef>,
    pub(crate) attribute_groups: Vec<AttributeGroupDef>,
    pub(crate) identities: Vec<IdentityConstraint>,
    pub(crate) notations: BTreeMap<QName, Notation>,
    pub(crate) globals: BTreeMap<ComponentKey, ComponentRef>,
    /// Substitution group head to its transitive members
    pub(crate) substitutions: BTreeMap<ElementId, Vec<ElementId>>,
}

impl ComponentTable {
    /// A table holding only anyType, used as a neutral context in tests
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            version: XsdVersion::V10,
            types: vec![TypeDef::Complex(ComplexTypeDef::any_type(ANY_TYPE))],
            elements: Vec::new(),
            attributes: Vec::new(),
            groups: Vec::new(),
            attribute_groups: Vec::new(),
            identities: Vec::new(),
            notations: BTreeMap::new(),
            globals: BTreeMap::new(),
            substitutions: BTreeMap::new(),
        }
    }

    /// Language version the table was compiled for
    pub fn version(&self) -> XsdVersion {
        self.version
    }

    /// Type definition behind a handle
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    /// Element declaration behind a handle
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id.index()]
    }

    /// Attribute declaration behind a handle
    pub fn attribute(&self, id: AttributeId) -> &AttributeDecl {
        &self.attributes[id.index()]
    }

    /// Model group definition behind a handle
    pub fn group(&self, id: GroupId) -> &GroupDef {
        &self.groups[id.index()]
    }

    /// Attribute group definition behind a handle
    pub fn attribute_group(&self, id: AttributeGroupId) -> &AttributeGroupDef {
        &self.attribute_groups[id.index()]
    }

    /// Identity constraint behind a handle
    pub fn identity(&self, id: IdentityId) -> &IdentityConstraint {
        &self.identities[id.index()]
    }

    /// Look up a top-level component
    pub fn lookup(&self, category: ComponentCategory, name: &QName) -> Option<ComponentRef> {
        self.globals
            .get(&ComponentKey::new(category, name.clone()))
            .copied()
    }

    /// Look up a global type definition
    pub fn lookup_type(&self, name: &QName) -> Option<TypeId> {
        match self.lookup(ComponentCategory::Type, name) {
            Some(ComponentRef::Type(id)) => Some(id),
            _ => None,
        }
    }

    /// Look up a global element declaration
    pub fn lookup_element(&self, name: &QName) -> Option<ElementId> {
        match self.lookup(ComponentCategory::Element, name) {
            Some(ComponentRef::Element(id)) => Some(id),
            _ => None,
        }
    }

    /// Look up a global attribute declaration
    pub fn lookup_attribute(&self, name: &QName) -> Option<AttributeId> {
        match self.lookup(ComponentCategory::Attribute, name) {
            Some(ComponentRef::Attribute(id)) => Some(id),
            _ => None,
        }
    }

    /// Look up a notation declaration
    pub fn lookup_notation(&self, name: &QName) -> Option<&Notation> {
        self.notations.get(name)
    }

    /// Top-level components in key order
    pub fn globals(&self) -> impl Iterator<Item = (&ComponentKey, &ComponentRef)> {
        self.globals.iter()
    }

    /// Number of type definitions, built-ins and anonymous types included
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of element declarations, local ones included
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Transitive substitution group members of a head element
    pub fn substitution_members(&self, head: ElementId) -> &[ElementId] {
        self.substitutions
            .get(&head)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Derivation methods on the chain from `derived` up to `base`
    ///
    /// Returns `None` when `base` is not an ancestor of `derived`. A type is
    /// derived from itself with an empty chain. Every type derives from
    /// anyType.
    pub fn derivation_path(&self, derived: TypeId, base: TypeId) -> Option<Vec<DerivationMethod>> {
        let mut methods = Vec::new();
        let mut current = derived;
        // Bounded by the number of types.
        for _ in 0..=self.types.len() {
            if current == base {
                return Some(methods);
            }
            match self.type_def(current).derivation() {
                Some((parent, method)) if parent != current => {
                    methods.push(method);
                    current = parent;
                }
                _ => break,
            }
        }
        if base == ANY_TYPE {
            return Some(methods);
        }
        None
    }

    /// Whether `derived` is `base` or derives from it
    pub fn is_derived_from(&self, derived: TypeId, base: TypeId) -> bool {
        if self.derivation_path(derived, base).is_some() {
            return true;
        }
        // Union members count as derived from the union for xsi:type purposes.
        match self.type_def(base).as_simple().map(|t| &t.variety) {
            Some(super::simple_types::Variety::Union(members)) => {
                members.iter().any(|m| self.is_derived_from(derived, *m))
            }
            _ => false,
        }
    }
}

impl SimpleTypeLookup for ComponentTable {
    fn simple_type(&self, id: TypeId) -> Option<&SimpleTypeDef> {
        self.types.get(id.index()).and_then(TypeDef::as_simple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::values::Primitive;

    fn table() -> ComponentTable {
        let mut table = ComponentTable::empty();
        table.types.push(TypeDef::Simple(SimpleTypeDef::primitive(
            QName::xsd("anySimpleType"),
            ANY_TYPE,
            Primitive::AnySimple,
        )));
        table.types.push(TypeDef::Simple(SimpleTypeDef::primitive(
            QName::xsd("decimal"),
            ANY_SIMPLE_TYPE,
            Primitive::Decimal,
        )));
        table.globals.insert(
            ComponentKey::new(ComponentCategory::Type, QName::xsd("decimal")),
            ComponentRef::Type(TypeId::new(2)),
        );
        table
    }

    #[test]
    fn test_lookup() {
        let table = table();
        assert_eq!(table.lookup_type(&QName::xsd("decimal")), Some(TypeId::new(2)));
        assert_eq!(table.lookup_type(&QName::xsd("string")), None);
        assert_eq!(table.lookup_element(&QName::xsd("decimal")), None);
        assert!(table.simple_type(TypeId::new(2)).is_some());
        assert!(table.simple_type(ANY_TYPE).is_none());
    }

    #[test]
    fn test_derivation_path() {
        let table = table();
        let decimal = TypeId::new(2);
        assert_eq!(
            table.derivation_path(decimal, ANY_SIMPLE_TYPE),
            Some(vec![DerivationMethod::Restriction])
        );
        assert_eq!(table.derivation_path(decimal, decimal), Some(vec![]));
        assert!(table.is_derived_from(decimal, ANY_TYPE));
        assert!(!table.is_derived_from(ANY_SIMPLE_TYPE, decimal));
    }
}
