//! XPath support for identity constraints
//!
//! `xs:selector` and `xs:field` use a small XPath subset:
//!
//! - `.` and `.//` at the start of a path
//! - child steps with a name test (`a`, `p:a`, `*`, `p:*`, `child::a`)
//! - a final attribute step in fields (`@id`, `attribute::p:id`)
//! - `|` unions of such paths
//!
//! Paths are compiled once, with prefixes resolved against the schema's
//! namespace bindings, into an [`XPathSelector`]. A [`SelectorEvaluator`]
//! turns a selector and a context element into a node sequence;
//! [`DefaultEvaluator`] walks the owned document tree.

mod selectors;

pub use selectors::{split_path, DefaultEvaluator, NameTest, PathExpr, Step, XPathSelector};

use std::fmt;

use crate::documents::Element;
use crate::namespaces::QName;

/// A node selected by a path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XPathNode<'a> {
    /// An element
    Element(&'a Element),
    /// An attribute of an element
    Attribute {
        /// Element carrying the attribute
        owner: &'a Element,
        /// Attribute name
        name: &'a QName,
        /// Attribute value as written
        value: &'a str,
    },
}

impl<'a> XPathNode<'a> {
    /// Document-order position; attributes sort right after their owner
    pub fn position(&self) -> (usize, usize) {
        match self {
            XPathNode::Element(e) => (e.index, 0),
            XPathNode::Attribute { owner, name, .. } => (
                owner.index,
                owner
                    .attributes
                    .get_index_of(*name)
                    .map_or(usize::MAX, |i| i + 1),
            ),
        }
    }

    /// The element, if this node is one
    pub fn as_element(&self) -> Option<&'a Element> {
        match self {
            XPathNode::Element(e) => Some(e),
            _ => None,
        }
    }

    /// String value of the node
    pub fn string_value(&self) -> String {
        match self {
            XPathNode::Element(e) => e.text_content().to_string(),
            XPathNode::Attribute { value, .. } => value.to_string(),
        }
    }
}

/// Evaluates compiled selector paths against a document tree
pub trait SelectorEvaluator: fmt::Debug + Send + Sync {
    /// Nodes selected by `path` from `context`, in document order, without duplicates
    fn evaluate<'a>(&self, path: &XPathSelector, context: &'a Element) -> Vec<XPathNode<'a>>;
}
