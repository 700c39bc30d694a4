//! Decoded value tree
//!
//! Decoding produces one [`DecodedElement`] per instance element, carrying
//! the typed values produced by simple type validation. The tree is
//! shape-agnostic: repeated children stay an ordered list and converters
//! decide how to render them. It implements `serde::Serialize`, so e.g.
//! `serde_json::to_value` gives a JSON rendering with names in Clark
//! notation.

use indexmap::IndexMap;
use serde::Serialize;

use crate::documents::Element;
use crate::namespaces::QName;

use super::values::{AtomicValue, SimpleValue};

/// A decoded element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedElement {
    /// Element name
    pub name: QName,
    /// Name of the governing type, when it is a named type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<QName>,
    /// Attributes in document order, followed by defaulted ones
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<QName, SimpleValue>,
    /// Value of simple content, or character data of mixed content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<SimpleValue>,
    /// Child elements in document order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DecodedElement>,
    /// Whether the element was nilled with `xsi:nil`
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nil: bool,
}

impl DecodedElement {
    /// An element without content
    pub fn new(name: QName) -> Self {
        Self {
            name,
            type_name: None,
            attributes: IndexMap::new(),
            value: None,
            children: Vec::new(),
            nil: false,
        }
    }

    /// Untyped decoding of an element subtree
    ///
    /// Attribute values and character data are kept as strings.
    pub fn untyped(element: &Element) -> Self {
        let mut decoded = Self::new(element.qname.clone());
        decoded.attributes = element
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), untyped_value(value)))
            .collect();
        if element.children.is_empty() || element.has_significant_text() {
            decoded.value = element.text.as_deref().map(untyped_value);
        }
        decoded.children = element.children.iter().map(Self::untyped).collect();
        decoded
    }

    /// Canonical lexical form of the element's value
    pub fn to_lexical(&self) -> Option<String> {
        self.value.as_ref().map(SimpleValue::to_lexical)
    }

    /// Value of an attribute
    pub fn attribute(&self, name: &QName) -> Option<&SimpleValue> {
        self.attributes.get(name)
    }

    /// First child with the given name
    pub fn child(&self, name: &QName) -> Option<&DecodedElement> {
        self.children.iter().find(|c| &c.name == name)
    }

    /// All children with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a QName) -> impl Iterator<Item = &'a DecodedElement> {
        self.children.iter().filter(move |c| &c.name == name)
    }
}

pub(crate) fn untyped_value(lexical: &str) -> SimpleValue {
    SimpleValue::Atomic(AtomicValue::String(lexical.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Document;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_untyped_tree() {
        let doc = Document::from_string(r#"<a id="1"><b>x</b><b/>  </a>"#).unwrap();
        let decoded = DecodedElement::untyped(doc.root().unwrap());
        assert_eq!(decoded.attribute(&QName::local("id")), Some(&untyped_value("1")));
        assert_eq!(decoded.value, None);
        let b = QName::local("b");
        assert_eq!(decoded.children_named(&b).count(), 2);
        assert_eq!(decoded.child(&b).and_then(|c| c.to_lexical()), Some("x".to_string()));
    }

    #[test]
    fn test_serialize() {
        let mut decoded = DecodedElement::new(QName::namespaced("urn:x", "price"));
        decoded.value = Some(SimpleValue::Atomic(AtomicValue::Decimal(
            Decimal::from_str("1.50").unwrap(),
        )));
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["name"], "{urn:x}price");
        assert!(json.get("children").is_none());
        assert!(json.get("nil").is_none());
        assert!(json.get("value").is_some());
    }
}
