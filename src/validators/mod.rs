//! XML Schema validators
//!
//! The schema machinery: component definitions, the two-phase compiler
//! (`parsing` collects raw components, `builders` resolves them into a
//! frozen [`ComponentTable`]), content model automata, identity constraints
//! and the document validator.

pub mod attributes;
pub mod base;
pub mod builders;
pub mod builtins;
pub mod complex_types;
pub mod decoded;
mod document_validation;
pub mod elements;
pub mod facets;
pub mod globals;
pub mod groups;
pub mod identities;
pub mod models;
pub mod parsing;
pub mod particles;
pub mod schemas;
pub mod simple_types;
pub mod validation;
pub mod values;
pub mod wildcards;

pub use attributes::{AttributeDecl, AttributeUse, Use, ValueConstraint, ValueConstraintKind};
pub use base::{
    AttributeId, ComponentCategory, ComponentKey, DerivationMethod, DerivationSet, ElementId,
    TypeId, ValidationMode,
};
pub use builders::XsdVersion;
pub use complex_types::{ComplexTypeDef, ContentType};
pub use decoded::DecodedElement;
pub use elements::ElementDecl;
pub use globals::{ComponentTable, TypeDef};
pub use identities::{IdentityConstraint, IdentityKind};
pub use models::ContentModel;
pub use parsing::SchemaSource;
pub use schemas::{compile, Schema, SchemaOptions};
pub use simple_types::{SimpleTypeDef, SimpleTypeLookup};
pub use validation::ValidationReport;
pub use values::{AtomicValue, SimpleValue};
pub use wildcards::{ProcessContents, Wildcard};
