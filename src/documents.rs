//! XML document handling
//!
//! Schemas and instances are both read into the same owned [`Element`] tree.
//! Every element carries fully resolved names, its in-scope namespace
//! bindings (needed for QName-valued content such as `xsi:type` or
//! `base="xs:string"`) and its position in document order, which the
//! identity constraint engine uses as a node identifier.

use crate::error::{Error, Result};
use crate::namespaces::{NamespaceContext, QName};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// XML Element in the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element qualified name
    pub qname: QName,
    /// Element attributes (namespace declarations excluded)
    pub attributes: IndexMap<QName, String>,
    /// Character data directly inside this element, concatenated
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
    /// Namespace bindings in scope at this element
    pub namespaces: NamespaceContext,
    /// Position in document order (root is 0)
    pub index: usize,
}

impl Element {
    /// Create a new element
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
            namespaces: NamespaceContext::new(),
            index: 0,
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.qname.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.qname.namespace.as_deref()
    }

    /// Get an unqualified attribute value by local name
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(qname, _)| qname.namespace.is_none() && qname.local_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// Get an attribute value by qualified name
    pub fn get_attribute_qname(&self, qname: &QName) -> Option<&str> {
        self.attributes.get(qname).map(|s| s.as_str())
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Append character data
    pub fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    /// Character data, or the empty string
    pub fn text_content(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Whether the element has character data other than white space
    pub fn has_significant_text(&self) -> bool {
        self.text_content().chars().any(|c| !c.is_whitespace())
    }

    /// Find child elements by local name
    pub fn find_children(&self, local_name: &str) -> Vec<&Element> {
        self.children
            .iter()
            .filter(|e| e.local_name() == local_name)
            .collect()
    }

    /// Iterate over this element and all its descendants in document order
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }

    fn number(&mut self, next: &mut usize) {
        self.index = *next;
        *next += 1;
        for child in &mut self.children {
            child.number(next);
        }
    }
}

/// XML Document representation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Root element of the document
    pub root: Option<Element>,
    /// Where the document was read from, if known
    pub location: Option<String>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml.as_bytes())
    }

    /// Parse an XML document from bytes
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.trim_text(false);

        let mut root = None;
        let mut element_stack: Vec<Element> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let element = Self::parse_element(&e, element_stack.last())?;
                    element_stack.push(element);
                }
                Ok(Event::End(_)) => {
                    if let Some(current) = element_stack.pop() {
                        match element_stack.last_mut() {
                            Some(parent) => parent.add_child(current),
                            None => root = Some(current),
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let element = Self::parse_element(&e, element_stack.last())?;
                    match element_stack.last_mut() {
                        Some(parent) => parent.add_child(element),
                        None => root = Some(element),
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                        current.push_text(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let bytes = e.into_inner();
                        current.push_text(&String::from_utf8_lossy(&bytes));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // Comments, processing instructions, declarations
            }
            buf.clear();
        }

        if !element_stack.is_empty() {
            return Err(Error::Xml("Unexpected end of document".to_string()));
        }
        if root.is_none() {
            return Err(Error::Xml("Document has no root element".to_string()));
        }

        let mut doc = Document {
            root,
            location: None,
        };
        doc.renumber();
        Ok(doc)
    }

    /// Build a document from a tree already parsed by `roxmltree`
    pub fn from_node_tree(tree: &roxmltree::Document<'_>) -> Result<Self> {
        let mut root = Self::convert_node(tree.root_element());
        let mut next = 0;
        root.number(&mut next);
        Ok(Document {
            root: Some(root),
            location: None,
        })
    }

    /// Set the location the document was read from
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Get the root element
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    /// Number of elements in the document
    pub fn element_count(&self) -> usize {
        self.root.as_ref().map(|r| r.iter().count()).unwrap_or(0)
    }

    fn renumber(&mut self) {
        if let Some(root) = &mut self.root {
            let mut next = 0;
            root.number(&mut next);
        }
    }

    /// Parse element from BytesStart event
    fn parse_element(start: &BytesStart<'_>, parent: Option<&Element>) -> Result<Element> {
        let mut namespaces = parent
            .map(|p| p.namespaces.clone())
            .unwrap_or_default();
        let mut raw_attributes = Vec::new();

        for attr_result in start.attributes() {
            let attr = attr_result
                .map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;

            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
                .to_string();

            let attr_value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();

            if attr_name == "xmlns" {
                namespaces.set_default_namespace(attr_value);
            } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
                namespaces.add_prefix(prefix, attr_value);
            } else {
                raw_attributes.push((attr_name, attr_value));
            }
        }

        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
            .to_string();
        let qname = namespaces.resolve(&name)?;

        let mut element = Element::new(qname);
        for (name, value) in raw_attributes {
            let qname = namespaces.resolve_attribute(&name)?;
            if element.attributes.insert(qname, value).is_some() {
                return Err(Error::Xml(format!("Duplicate attribute '{}'", name)));
            }
        }
        element.namespaces = namespaces;
        Ok(element)
    }

    fn convert_node(node: roxmltree::Node<'_, '_>) -> Element {
        let tag = node.tag_name();
        let mut element = Element::new(QName::new(tag.namespace(), tag.name()));

        for ns in node.namespaces() {
            match ns.name() {
                Some(prefix) => element.namespaces.add_prefix(prefix, ns.uri()),
                None => element.namespaces.set_default_namespace(ns.uri()),
            }
        }
        for attr in node.attributes() {
            element
                .attributes
                .insert(QName::new(attr.namespace(), attr.name()), attr.value().to_string());
        }
        for child in node.children() {
            if child.is_element() {
                element.add_child(Self::convert_node(child));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    element.push_text(text);
                }
            }
        }
        element
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::XSI_NAMESPACE;

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.local_name(), "root");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].local_name(), "child");
        assert_eq!(root.children[0].text.as_deref(), Some("text"));
    }

    #[test]
    fn test_parse_with_attributes() {
        let xml = r#"<root attr1="value1" attr2="a &amp; b"><child/></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.get_attribute("attr1"), Some("value1"));
        assert_eq!(root.get_attribute("attr2"), Some("a & b"));
    }

    #[test]
    fn test_parse_with_namespaces() {
        let xml = r#"<p:root xmlns:p="urn:p" xmlns="urn:d" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"><child/></p:root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.qname, QName::namespaced("urn:p", "root"));
        assert_eq!(root.children[0].qname, QName::namespaced("urn:d", "child"));
        assert_eq!(
            root.get_attribute_qname(&QName::namespaced(XSI_NAMESPACE, "nil")),
            Some("true")
        );
        assert_eq!(root.children[0].namespaces.get_namespace("p"), Some("urn:p"));
    }

    #[test]
    fn test_unbound_prefix_is_error() {
        assert!(matches!(
            Document::from_string("<x:root/>"),
            Err(Error::Namespace(_))
        ));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            Document::from_string("<a><b></a>"),
            Err(Error::Xml(_))
        ));
        assert!(Document::from_string("<a>").is_err());
    }

    #[test]
    fn test_document_order_index() {
        let doc = Document::from_string("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<(String, usize)> = doc
            .root()
            .unwrap()
            .iter()
            .map(|e| (e.local_name().to_string(), e.index))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 2),
                ("d".to_string(), 3)
            ]
        );
        assert_eq!(doc.element_count(), 4);
    }

    #[test]
    fn test_cdata_and_mixed_text() {
        let doc = Document::from_string("<a>x<![CDATA[<y>]]><b/>z</a>").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.text_content(), "x<y>z");
        assert!(root.has_significant_text());
    }

    #[test]
    fn test_from_node_tree_matches_parse() {
        let xml = r#"<r xmlns="urn:r" a="1"><s>t</s></r>"#;
        let tree = roxmltree::Document::parse(xml).unwrap();
        let converted = Document::from_node_tree(&tree).unwrap();
        let parsed = Document::from_string(xml).unwrap();
        assert_eq!(converted.root().unwrap().qname, parsed.root().unwrap().qname);
        assert_eq!(
            converted.root().unwrap().children[0].text,
            parsed.root().unwrap().children[0].text
        );
        assert_eq!(converted.root().unwrap().get_attribute("a"), Some("1"));
    }
}
