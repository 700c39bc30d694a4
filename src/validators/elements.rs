//! XSD element declarations

use crate::namespaces::QName;

use super::attributes::ValueConstraint;
use super::base::{DerivationSet, ElementId, IdentityId, TypeId};

/// An element declaration (global or local)
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    /// Element name
    pub name: QName,
    /// Declared type
    pub type_id: TypeId,
    /// Whether `xsi:nil="true"` is allowed
    pub nillable: bool,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
    /// Substitution group heads this element may replace
    pub substitution_group: Vec<ElementId>,
    /// Identity constraints declared on this element
    pub identities: Vec<IdentityId>,
    /// Abstract elements never appear in instances themselves
    pub is_abstract: bool,
    /// Substitutions and derivations blocked in instances
    pub block: DerivationSet,
    /// Derivations disallowed for substitution group members
    pub final_: DerivationSet,
    /// Declared at the top level of a schema
    pub global: bool,
}

impl ElementDecl {
    /// Create a declaration with default properties
    pub fn new(name: QName, type_id: TypeId) -> Self {
        Self {
            name,
            type_id,
            nillable: false,
            value_constraint: None,
            substitution_group: Vec::new(),
            identities: Vec::new(),
            is_abstract: false,
            block: DerivationSet::default(),
            final_: DerivationSet::default(),
            global: false,
        }
    }
}
