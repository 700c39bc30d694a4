//! XSD complex type definitions
//!
//! The content of a complex type is empty, simple (a simple type for the
//! character data) or a model group, optionally mixed with character data.
//! The model group is compiled to a [`ContentModel`] once all components
//! of the schema are known.

use indexmap::IndexMap;

use crate::namespaces::QName;

use super::attributes::AttributeUse;
use super::base::{DerivationMethod, DerivationSet, TypeId};
use super::groups::{Compositor, ModelGroup};
use super::models::ContentModel;
use super::particles::{Occurs, Particle, Term};
use super::wildcards::{ProcessContents, Wildcard};

/// Content type of a complex type
#[derive(Debug, Clone, PartialEq)]
pub enum ContentType {
    /// No character data and no children
    Empty,
    /// Character data of a simple type, no children
    Simple(TypeId),
    /// Children only; whitespace between them is ignored
    ElementOnly(ModelGroup),
    /// Children interleaved with character data
    Mixed(ModelGroup),
}

impl ContentType {
    /// The model group of element-only and mixed content
    pub fn model_group(&self) -> Option<&ModelGroup> {
        match self {
            ContentType::ElementOnly(g) | ContentType::Mixed(g) => Some(g),
            _ => None,
        }
    }

    /// Whether character data is allowed between children
    pub fn is_mixed(&self) -> bool {
        matches!(self, ContentType::Mixed(_))
    }

    /// Short name for messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            ContentType::Empty => "empty",
            ContentType::Simple(_) => "simple",
            ContentType::ElementOnly(_) => "element-only",
            ContentType::Mixed(_) => "mixed",
        }
    }
}

/// A complex type definition
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexTypeDef {
    /// Name, absent for anonymous types
    pub name: Option<QName>,
    /// Base type; anyType is its own base
    pub base: TypeId,
    /// How the type was derived from its base
    pub derivation: DerivationMethod,
    /// Content type
    pub content: ContentType,
    /// Attribute uses keyed by attribute name
    pub attributes: IndexMap<QName, AttributeUse>,
    /// Attribute wildcard
    pub attribute_wildcard: Option<Wildcard>,
    /// Abstract types cannot be used directly in instances
    pub is_abstract: bool,
    /// Derivations that cannot be substituted via `xsi:type`
    pub block: DerivationSet,
    /// Derivations disallowed for types derived from this one
    pub final_: DerivationSet,
    /// Compiled content model, present for element-only and mixed content
    pub model: Option<ContentModel>,
}

impl ComplexTypeDef {
    /// The `xs:anyType` definition: mixed content admitting anything laxly
    pub fn any_type(id: TypeId) -> Self {
        let any = Particle::new(
            Term::Wildcard(Wildcard::any(ProcessContents::Lax)),
            Occurs::zero_or_more(),
        );
        Self {
            name: Some(QName::xsd("anyType")),
            base: id,
            derivation: DerivationMethod::Restriction,
            content: ContentType::Mixed(ModelGroup::new(Compositor::Sequence, vec![any])),
            attributes: IndexMap::new(),
            attribute_wildcard: Some(Wildcard::any(ProcessContents::Lax)),
            is_abstract: false,
            block: DerivationSet::default(),
            final_: DerivationSet::default(),
            model: None,
        }
    }

    /// An anonymous type with empty content deriving from `base`
    pub fn empty(base: TypeId) -> Self {
        Self {
            name: None,
            base,
            derivation: DerivationMethod::Restriction,
            content: ContentType::Empty,
            attributes: IndexMap::new(),
            attribute_wildcard: None,
            is_abstract: false,
            block: DerivationSet::default(),
            final_: DerivationSet::default(),
            model: None,
        }
    }

    /// Name for messages
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => "anonymous complex type".to_string(),
        }
    }

    /// Required attribute names
    pub fn required_attributes(&self) -> impl Iterator<Item = &QName> {
        self.attributes
            .iter()
            .filter(|(_, u)| u.is_required())
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_type_shape() {
        let any = ComplexTypeDef::any_type(TypeId::new(0));
        assert!(any.content.is_mixed());
        let group = any.content.model_group().unwrap();
        assert_eq!(group.particles.len(), 1);
        assert_eq!(group.particles[0].occurs, Occurs::zero_or_more());
        assert_eq!(
            any.attribute_wildcard.as_ref().map(|w| w.process_contents),
            Some(ProcessContents::Lax)
        );
        assert_eq!(any.base, TypeId::new(0));
    }

    #[test]
    fn test_empty_type() {
        let ty = ComplexTypeDef::empty(TypeId::new(0));
        assert_eq!(ty.content.kind_name(), "empty");
        assert_eq!(ty.required_attributes().count(), 0);
        assert_eq!(ty.display_name(), "anonymous complex type");
    }
}
