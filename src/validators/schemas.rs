//! Compiled schemas
//!
//! [`Schema`] is the public face of the crate: it compiles one or more
//! schema documents into a frozen component table and validates or decodes
//! instance documents against it.
//!
//! A compiled schema is immutable. It is `Send + Sync` and cheap to clone,
//! so one instance can serve many threads; all per-validation state lives
//! in the validation call.
//!
//! # Example
//!
//! ```
//! use xsdgraph::{Schema, SchemaOptions};
//!
//! let schema = Schema::from_str(
//!     r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
//!          <xs:element name="qty" type="xs:positiveInteger"/>
//!        </xs:schema>"#,
//!     SchemaOptions::default(),
//! )?;
//! assert!(schema.is_valid_str("<qty>3</qty>"));
//! assert!(!schema.is_valid_str("<qty>0</qty>"));
//! # Ok::<(), xsdgraph::Error>(())
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::documents::Document;
use crate::error::{Error, Result, SchemaError, ValidationError};
use crate::limits::Limits;
use crate::loaders::{FsLoader, ResourceLoader};
use crate::namespaces::QName;
use crate::xpath::{DefaultEvaluator, SelectorEvaluator};

use super::base::{ElementId, TypeId, ValidationMode};
use super::builders::{self, XsdVersion};
use super::decoded::DecodedElement;
use super::document_validation::validate_document;
use super::elements::ElementDecl;
use super::globals::{ComponentTable, TypeDef};
use super::parsing::{SchemaSource, SourceParser};
use super::validation::ValidationReport;

/// Compile and validation options
///
/// Deserializable, so options can come from a configuration file; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Default validation mode
    pub mode: ValidationMode,
    /// XSD language version
    pub xsd_version: XsdVersion,
    /// Maximum element nesting accepted in instance documents
    pub max_depth: usize,
    /// Recover from schema errors instead of failing the compile
    pub lax_compile: bool,
    /// Resource limits for compiling
    pub limits: Limits,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Strict,
            xsd_version: XsdVersion::V10,
            max_depth: 1000,
            lax_compile: false,
            limits: Limits::default(),
        }
    }
}

impl SchemaOptions {
    /// Set the default validation mode
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the XSD version
    pub fn with_version(mut self, version: XsdVersion) -> Self {
        self.xsd_version = version;
        self
    }

    /// Set the maximum instance nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enable or disable lax compiling
    pub fn with_lax_compile(mut self, lax: bool) -> Self {
        self.lax_compile = lax;
        self
    }

    /// Set the resource limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// A compiled schema
#[derive(Clone)]
pub struct Schema {
    table: Arc<ComponentTable>,
    options: SchemaOptions,
    compile_errors: Vec<SchemaError>,
    evaluator: Arc<dyn SelectorEvaluator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("version", &self.table.version())
            .field("types", &self.table.type_count())
            .field("elements", &self.table.element_count())
            .field("compile_errors", &self.compile_errors.len())
            .finish()
    }
}

/// Compile schema sources with the filesystem loader
pub fn compile(sources: &[SchemaSource], options: SchemaOptions) -> Result<Schema> {
    Schema::compile(sources, options)
}

impl Schema {
    /// Compile schema sources, fetching referenced locations from the filesystem
    pub fn compile(sources: &[SchemaSource], options: SchemaOptions) -> Result<Self> {
        let loader = FsLoader::new().with_limits(options.limits.clone());
        Self::compile_with_loader(sources, options, &loader)
    }

    /// Compile schema sources with a custom resource loader
    pub fn compile_with_loader(
        sources: &[SchemaSource],
        options: SchemaOptions,
        loader: &dyn ResourceLoader,
    ) -> Result<Self> {
        let mut parser = SourceParser::new(loader, &options.limits, options.lax_compile);
        for source in sources {
            parser.add_source(source)?;
        }
        let raw = parser.finish();
        let (table, compile_errors) =
            builders::build(&raw, options.xsd_version, &options.limits, options.lax_compile)?;
        info!(
            version = %options.xsd_version,
            sources = raw.sources_loaded,
            types = table.type_count(),
            elements = table.element_count(),
            recovered = compile_errors.len(),
            "schema compiled"
        );
        Ok(Self {
            table: Arc::new(table),
            options,
            compile_errors,
            evaluator: Arc::new(DefaultEvaluator),
        })
    }

    /// Compile a single schema document given as text
    pub fn from_str(xsd: &str, options: SchemaOptions) -> Result<Self> {
        Self::compile(&[SchemaSource::text(xsd)], options)
    }

    /// Compile the schema document at `path`
    pub fn from_file(path: impl AsRef<Path>, options: SchemaOptions) -> Result<Self> {
        let location = path.as_ref().to_string_lossy().into_owned();
        Self::compile(&[SchemaSource::location(location)], options)
    }

    /// Replace the selector evaluator used for identity constraints
    pub fn with_evaluator(mut self, evaluator: Arc<dyn SelectorEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Validate a document in the default mode
    pub fn validate(&self, doc: &Document) -> Result<ValidationReport> {
        self.validate_with_mode(doc, self.options.mode)
    }

    /// Validate a document in the given mode
    ///
    /// Validation failures are reported in the returned report; `Err` is
    /// left for conditions that stop validation altogether, such as an
    /// exceeded depth limit.
    pub fn validate_with_mode(&self, doc: &Document, mode: ValidationMode) -> Result<ValidationReport> {
        match self.decode_with_mode(doc, mode) {
            Ok((_, errors)) => Ok(ValidationReport::failure(errors)),
            Err(Error::Validation(error)) => Ok(ValidationReport::failure(vec![error])),
            Err(e) => Err(e),
        }
    }

    /// Parse and validate an XML string in the default mode
    pub fn validate_str(&self, xml: &str) -> Result<ValidationReport> {
        let doc = Document::from_string(xml)?;
        self.validate(&doc)
    }

    /// Whether a document is valid; any error counts as invalid
    pub fn is_valid(&self, doc: &Document) -> bool {
        self.validate_with_mode(doc, ValidationMode::Strict)
            .map(|report| report.valid)
            .unwrap_or(false)
    }

    /// Whether an XML string is well-formed and valid
    pub fn is_valid_str(&self, xml: &str) -> bool {
        Document::from_string(xml)
            .map(|doc| self.is_valid(&doc))
            .unwrap_or(false)
    }

    /// Validate all errors of a document, regardless of the default mode
    pub fn iter_errors(&self, doc: &Document) -> Result<Vec<ValidationError>> {
        Ok(self.validate_with_mode(doc, ValidationMode::Lax)?.errors)
    }

    /// Decode a document in the default mode
    ///
    /// Returns the decoded tree and the errors met on the way. In lax mode
    /// the tree is a best-effort decoding even when errors are returned.
    pub fn decode(&self, doc: &Document) -> Result<(DecodedElement, Vec<ValidationError>)> {
        self.decode_with_mode(doc, self.options.mode)
    }

    /// Decode a document in the given mode
    pub fn decode_with_mode(
        &self,
        doc: &Document,
        mode: ValidationMode,
    ) -> Result<(DecodedElement, Vec<ValidationError>)> {
        debug!(mode = %mode, "validating document");
        validate_document(
            &self.table,
            self.evaluator.as_ref(),
            doc,
            mode,
            self.options.max_depth,
        )
    }

    /// Parse and decode an XML string in the default mode
    pub fn decode_str(&self, xml: &str) -> Result<(DecodedElement, Vec<ValidationError>)> {
        let doc = Document::from_string(xml)?;
        self.decode(&doc)
    }

    /// Schema errors recovered from while compiling in lax mode
    pub fn compile_errors(&self) -> &[SchemaError] {
        &self.compile_errors
    }

    /// Options the schema was compiled with
    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// XSD version of the schema
    pub fn version(&self) -> XsdVersion {
        self.table.version()
    }

    /// The frozen component table
    pub fn table(&self) -> &ComponentTable {
        &self.table
    }

    /// Global element declaration by name
    pub fn lookup_element(&self, name: &QName) -> Option<&ElementDecl> {
        self.table.lookup_element(name).map(|id| self.table.element(id))
    }

    /// Global or built-in type definition by name
    pub fn lookup_type(&self, name: &QName) -> Option<&TypeDef> {
        self.table.lookup_type(name).map(|id| self.table.type_def(id))
    }

    /// Id of a global element
    pub fn element_id(&self, name: &QName) -> Option<ElementId> {
        self.table.lookup_element(name)
    }

    /// Id of a global or built-in type
    pub fn type_id(&self, name: &QName) -> Option<TypeId> {
        self.table.lookup_type(name)
    }

    /// Number of global element declarations
    pub fn element_count(&self) -> usize {
        self.table.element_count()
    }

    /// Number of type definitions, built-ins included
    pub fn type_count(&self) -> usize {
        self.table.type_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SchemaErrorKind, ValidationErrorKind};
    use crate::loaders::MemoryLoader;
    use pretty_assertions::assert_eq;

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="list">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="item" type="xs:int" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    #[test]
    fn test_options_deserialize() {
        let options: SchemaOptions =
            serde_json::from_str(r#"{"mode": "lax", "xsd_version": "1.1"}"#).unwrap();
        assert_eq!(options.mode, ValidationMode::Lax);
        assert_eq!(options.xsd_version, XsdVersion::V11);
        assert_eq!(options.max_depth, 1000);
        assert!(!options.lax_compile);
    }

    #[test]
    fn test_options_builders() {
        let options = SchemaOptions::default()
            .with_mode(ValidationMode::Skip)
            .with_version(XsdVersion::V11)
            .with_max_depth(5)
            .with_lax_compile(true)
            .with_limits(Limits::strict());
        assert_eq!(options.mode, ValidationMode::Skip);
        assert_eq!(options.max_depth, 5);
        assert!(options.lax_compile);
        assert_eq!(options.limits, Limits::strict());
    }

    #[test]
    fn test_validate_modes() {
        let schema = Schema::from_str(XSD, SchemaOptions::default()).unwrap();
        let xml = "<list><item>x</item><item>y</item></list>";

        let strict = schema.validate_str(xml).unwrap();
        assert!(!strict.valid);
        assert_eq!(strict.errors.len(), 1);

        let doc = Document::from_string(xml).unwrap();
        let lax = schema.validate_with_mode(&doc, ValidationMode::Lax).unwrap();
        assert_eq!(lax.errors.len(), 2);
        assert_eq!(lax.errors_of(ValidationErrorKind::FacetViolation).count(), 2);

        let skip = schema.validate_with_mode(&doc, ValidationMode::Skip).unwrap();
        assert!(skip.valid);
    }

    #[test]
    fn test_decode() {
        let schema = Schema::from_str(XSD, SchemaOptions::default()).unwrap();
        let (decoded, errors) = schema.decode_str("<list><item> 7 </item></list>").unwrap();
        assert!(errors.is_empty());
        assert_eq!(decoded.children[0].to_lexical(), Some("7".to_string()));
    }

    #[test]
    fn test_compile_with_memory_loader() {
        let loader = MemoryLoader::new().with_resource(
            "schemas/types.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:simpleType name="code">
                   <xs:restriction base="xs:string"><xs:length value="3"/></xs:restriction>
                 </xs:simpleType>
               </xs:schema>"#,
        );
        let main = SchemaSource::named(
            "schemas/main.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:include schemaLocation="types.xsd"/>
                 <xs:element name="code" type="code"/>
               </xs:schema>"#,
        );
        let schema = Schema::compile_with_loader(&[main], SchemaOptions::default(), &loader).unwrap();
        assert!(schema.is_valid_str("<code>abc</code>"));
        assert!(!schema.is_valid_str("<code>abcd</code>"));
        assert!(schema.lookup_type(&QName::local("code")).is_some());
    }

    #[test]
    fn test_lax_compile_keeps_errors() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:element name="a" type="missing"/>
          <xs:element name="b" type="xs:string"/>
        </xs:schema>"#;
        let err = Schema::from_str(xsd, SchemaOptions::default()).unwrap_err();
        assert_eq!(
            err.as_schema_error().map(|e| e.kind),
            Some(SchemaErrorKind::UnresolvedReference)
        );

        let schema = Schema::from_str(xsd, SchemaOptions::default().with_lax_compile(true)).unwrap();
        assert_eq!(schema.compile_errors().len(), 1);
        assert!(schema.is_valid_str("<b>text</b>"));
    }

    #[test]
    fn test_schema_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Schema>();
    }
}
