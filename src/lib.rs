//! # xsdgraph
//!
//! An XML Schema (XSD 1.0 and 1.1) compiler and instance validator.
//!
//! Schema documents are compiled into an immutable component graph: every
//! type, element, attribute and group reference is resolved to a handle in a
//! frozen [`ComponentTable`](validators::ComponentTable), and every complex
//! content model is compiled to a deterministic automaton. Instance
//! documents are then validated against the graph in one traversal, with
//! identity constraints (`xs:unique`, `xs:key`, `xs:keyref`) checked in the
//! same pass, and optionally decoded into a typed value tree.
//!
//! ## Features
//!
//! - Include, import, redefine and override, with chameleon includes
//! - The built-in datatypes of XSD 1.0 and 1.1, with facet checking
//! - Wildcards, substitution groups, `xsi:type`, `xsi:nil`, `block` and `abstract`
//! - Strict, lax and skip validation modes
//! - Lax compiling that recovers from schema errors
//! - Pluggable resource loaders and selector evaluators
//!
//! ## Example
//!
//! ```
//! use xsdgraph::{Schema, SchemaOptions, ValidationMode};
//!
//! let schema = Schema::from_str(
//!     r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
//!          <xs:element name="order">
//!            <xs:complexType>
//!              <xs:sequence>
//!                <xs:element name="qty" type="xs:positiveInteger"/>
//!              </xs:sequence>
//!            </xs:complexType>
//!          </xs:element>
//!        </xs:schema>"#,
//!     SchemaOptions::default().with_mode(ValidationMode::Lax),
//! )?;
//!
//! let report = schema.validate_str("<order><qty>0</qty></order>")?;
//! assert!(!report.valid);
//!
//! let (decoded, errors) = schema.decode_str("<order><qty>12</qty></order>")?;
//! assert!(errors.is_empty());
//! assert_eq!(decoded.children[0].to_lexical().as_deref(), Some("12"));
//! # Ok::<(), xsdgraph::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod documents;
pub mod error;
pub mod limits;
pub mod loaders;
pub mod locations;
pub mod names;
pub mod namespaces;
pub mod validators;
pub mod xpath;

pub use documents::{Document, Element};
pub use error::{
    Error, Result, SchemaError, SchemaErrorKind, ValidationError, ValidationErrorKind,
};
pub use limits::Limits;
pub use loaders::{FsLoader, MemoryLoader, ResourceLoader};
pub use namespaces::{NamespaceContext, QName};
pub use validators::{
    compile, DecodedElement, Schema, SchemaOptions, SchemaSource, SimpleValue, ValidationMode,
    ValidationReport, XsdVersion,
};
pub use xpath::{DefaultEvaluator, SelectorEvaluator, XPathNode};

/// Version of the xsdgraph library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XSD 1.0 namespace
pub const XSD_1_0_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XSD 1.1 namespace
pub const XSD_1_1_NAMESPACE: &str = "http://www.w3.org/2009/XMLSchema";
