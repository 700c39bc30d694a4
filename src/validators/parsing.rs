//! Schema source loading
//!
//! This is the parse phase of compilation. Every schema document is read
//! into an element tree, `include`, `import`, `redefine` and `override` are
//! followed transitively, and each top-level declaration is registered under
//! its `(category, name)` key as a [`RawComponent`]. Nothing is resolved
//! here; the builder turns raw components into table entries on demand.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::documents::{Document, Element};
use crate::error::{Error, Result, SchemaError, SchemaErrorKind};
use crate::limits::Limits;
use crate::loaders::ResourceLoader;
use crate::namespaces::{QName, XSD_NAMESPACE};

use super::base::{ComponentCategory, ComponentKey, DerivationSet, Form};

/// XSD element local names
pub(crate) mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const GROUP: &str = "group";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const ANNOTATION: &str = "annotation";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const REDEFINE: &str = "redefine";
    pub const OVERRIDE: &str = "override";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const ANY: &str = "any";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const NOTATION: &str = "notation";
    pub const UNIQUE: &str = "unique";
    pub const KEY: &str = "key";
    pub const KEYREF: &str = "keyref";
    pub const SELECTOR: &str = "selector";
    pub const FIELD: &str = "field";
    pub const DEFAULT_OPEN_CONTENT: &str = "defaultOpenContent";
}

/// XSD attribute names
pub(crate) mod xsd_attrs {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const TARGET_NAMESPACE: &str = "targetNamespace";
    pub const ELEMENT_FORM_DEFAULT: &str = "elementFormDefault";
    pub const ATTRIBUTE_FORM_DEFAULT: &str = "attributeFormDefault";
    pub const BLOCK_DEFAULT: &str = "blockDefault";
    pub const FINAL_DEFAULT: &str = "finalDefault";
    pub const XPATH_DEFAULT_NAMESPACE: &str = "xpathDefaultNamespace";
    pub const NILLABLE: &str = "nillable";
    pub const DEFAULT: &str = "default";
    pub const FIXED: &str = "fixed";
    pub const FORM: &str = "form";
    pub const BASE: &str = "base";
    pub const VALUE: &str = "value";
    pub const MIXED: &str = "mixed";
    pub const ABSTRACT: &str = "abstract";
    pub const BLOCK: &str = "block";
    pub const FINAL: &str = "final";
    pub const SUBSTITUTION_GROUP: &str = "substitutionGroup";
    pub const NAMESPACE: &str = "namespace";
    pub const NOT_NAMESPACE: &str = "notNamespace";
    pub const NOT_QNAME: &str = "notQName";
    pub const PROCESS_CONTENTS: &str = "processContents";
    pub const SCHEMA_LOCATION: &str = "schemaLocation";
    pub const ITEM_TYPE: &str = "itemType";
    pub const MEMBER_TYPES: &str = "memberTypes";
    pub const PUBLIC: &str = "public";
    pub const SYSTEM: &str = "system";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const USE: &str = "use";
    pub const REFER: &str = "refer";
    pub const XPATH: &str = "xpath";
}

use xsd_attrs as attrs;
use xsd_elements as tags;

/// A schema document handed to the compiler
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Schema text; the location, if any, anchors relative references
    Text {
        /// Where the text came from
        location: Option<String>,
        /// The schema document
        content: String,
    },
    /// A location fetched through the resource loader
    Location(String),
    /// An already parsed document
    Document(Document),
}

impl SchemaSource {
    /// Schema text without a location
    pub fn text(content: impl Into<String>) -> Self {
        SchemaSource::Text {
            location: None,
            content: content.into(),
        }
    }

    /// Schema text registered under a location
    pub fn named(location: impl Into<String>, content: impl Into<String>) -> Self {
        SchemaSource::Text {
            location: Some(location.into()),
            content: content.into(),
        }
    }

    /// A location to fetch
    pub fn location(location: impl Into<String>) -> Self {
        SchemaSource::Location(location.into())
    }
}

impl From<&str> for SchemaSource {
    fn from(content: &str) -> Self {
        SchemaSource::text(content)
    }
}

/// Settings of one schema document that affect how its declarations read
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SourceInfo {
    pub location: Option<String>,
    pub target_namespace: Option<String>,
    /// Included without a target namespace into a schema that has one
    pub chameleon: bool,
    pub element_form: Form,
    pub attribute_form: Form,
    pub block_default: DerivationSet,
    pub final_default: DerivationSet,
    pub xpath_default_namespace: Option<String>,
}

impl SourceInfo {
    /// Name in the target namespace
    pub(crate) fn qualify(&self, local: &str) -> QName {
        QName::new(self.target_namespace.clone(), local.trim())
    }

    /// Resolve a QName-valued attribute against a node's bindings
    pub(crate) fn resolve_qname(&self, node: &Element, value: &str) -> Result<QName> {
        let qname = node.namespaces.resolve(value)?;
        if qname.namespace.is_none() && self.chameleon {
            return Ok(QName::new(self.target_namespace.clone(), qname.local_name));
        }
        Ok(qname)
    }

    /// Location for messages
    pub(crate) fn label(&self) -> String {
        self.location
            .clone()
            .unwrap_or_else(|| "<inline schema>".to_string())
    }
}

/// A top-level declaration as written, with its document settings
#[derive(Debug, Clone)]
pub(crate) struct RawComponent {
    pub source: Arc<SourceInfo>,
    pub node: Element,
    /// The definition a `redefine` replaced; self-references resolve to it
    pub redefined: Option<Box<RawComponent>>,
}

impl RawComponent {
    /// This definition or one it redefines, `level` steps down the chain
    pub(crate) fn at_level(&self, level: usize) -> Option<&RawComponent> {
        let mut current = self;
        for _ in 0..level {
            current = current.redefined.as_deref()?;
        }
        Some(current)
    }
}

/// Everything the parse phase found
#[derive(Debug, Default)]
pub(crate) struct RawSchema {
    pub components: BTreeMap<ComponentKey, RawComponent>,
    pub sources_loaded: usize,
    /// Errors collected in lax compile mode
    pub errors: Vec<SchemaError>,
}

/// How a document was reached, which fixes its expected target namespace
#[derive(Debug, Clone)]
enum Inclusion {
    Root,
    Include(Option<String>),
    Import(Option<String>),
}

pub(crate) fn is_xsd(node: &Element, local: &str) -> bool {
    node.qname.is(Some(XSD_NAMESPACE), local)
}

fn component_category(tag: &str) -> Option<ComponentCategory> {
    match tag {
        tags::SIMPLE_TYPE | tags::COMPLEX_TYPE => Some(ComponentCategory::Type),
        tags::ELEMENT => Some(ComponentCategory::Element),
        tags::ATTRIBUTE => Some(ComponentCategory::Attribute),
        tags::GROUP => Some(ComponentCategory::Group),
        tags::ATTRIBUTE_GROUP => Some(ComponentCategory::AttributeGroup),
        tags::NOTATION => Some(ComponentCategory::Notation),
        _ => None,
    }
}

fn invalid(message: impl Into<String>, info: Option<&SourceInfo>) -> Error {
    let mut err = SchemaError::new(SchemaErrorKind::InvalidComponent, message);
    if let Some(info) = info {
        err = err.with_location(info.label());
    }
    err.into()
}

fn resource_error(location: &str, err: Error) -> Error {
    match err {
        Error::LimitExceeded(_) | Error::Schema(_) => err,
        other => SchemaError::new(
            SchemaErrorKind::Resource,
            format!("failed to load schema '{}': {}", location, other),
        )
        .with_location(location)
        .into(),
    }
}

/// Loads schema documents and registers their top-level declarations
pub(crate) struct SourceParser<'l> {
    loader: &'l dyn ResourceLoader,
    limits: &'l Limits,
    lax: bool,
    visited: HashSet<String>,
    in_progress: Vec<String>,
    raw: RawSchema,
}

impl<'l> SourceParser<'l> {
    pub(crate) fn new(loader: &'l dyn ResourceLoader, limits: &'l Limits, lax: bool) -> Self {
        Self {
            loader,
            limits,
            lax,
            visited: HashSet::new(),
            in_progress: Vec::new(),
            raw: RawSchema::default(),
        }
    }

    /// Load a source and everything it pulls in
    pub(crate) fn add_source(&mut self, source: &SchemaSource) -> Result<()> {
        match source {
            SchemaSource::Text { location, content } => {
                self.limits.check_source_size(content.len())?;
                let doc = Document::from_string(content).map_err(|e| {
                    resource_error(location.as_deref().unwrap_or("<inline schema>"), e)
                })?;
                self.add_document(&doc, location.clone())
            }
            SchemaSource::Location(location) => {
                self.load(location, None, Inclusion::Root, 0)?;
                Ok(())
            }
            SchemaSource::Document(doc) => self.add_document(doc, doc.location.clone()),
        }
    }

    fn add_document(&mut self, doc: &Document, location: Option<String>) -> Result<()> {
        if let Some(location) = &location {
            if !self.visited.insert(location.clone()) {
                debug!(location = %location, "schema source already loaded, skipping");
                return Ok(());
            }
        }
        self.parse_document(doc, location, Inclusion::Root, 0)
    }

    pub(crate) fn finish(self) -> RawSchema {
        self.raw
    }

    /// Record an error in lax mode, propagate it otherwise
    fn fail(&mut self, err: Error) -> Result<()> {
        match err {
            Error::Schema(e) if self.lax => {
                warn!(error = %e, "schema error ignored in lax compile mode");
                self.raw.errors.push(e);
                Ok(())
            }
            other => Err(other),
        }
    }

    fn load(
        &mut self,
        location: &str,
        base: Option<&str>,
        inclusion: Inclusion,
        depth: usize,
    ) -> Result<String> {
        let resolved = self
            .loader
            .resolve(location, base)
            .map_err(|e| resource_error(location, e))?;
        if self.visited.contains(&resolved) {
            debug!(location = %resolved, "schema source already loaded, skipping");
            return Ok(resolved);
        }
        self.visited.insert(resolved.clone());

        let bytes = self
            .loader
            .fetch(&resolved)
            .map_err(|e| resource_error(&resolved, e))?;
        self.limits.check_source_size(bytes.len())?;
        let doc = Document::parse(&bytes).map_err(|e| resource_error(&resolved, e))?;
        self.parse_document(&doc, Some(resolved.clone()), inclusion, depth)?;
        Ok(resolved)
    }

    fn source_info(
        &self,
        root: &Element,
        location: Option<String>,
        inclusion: &Inclusion,
    ) -> Result<SourceInfo> {
        let declared = root
            .get_attribute(attrs::TARGET_NAMESPACE)
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);

        let mut info = SourceInfo {
            location,
            target_namespace: declared.clone(),
            chameleon: false,
            element_form: Form::default(),
            attribute_form: Form::default(),
            block_default: DerivationSet::default(),
            final_default: DerivationSet::default(),
            xpath_default_namespace: None,
        };

        match inclusion {
            Inclusion::Root => {}
            Inclusion::Include(expected) => match (&declared, expected) {
                (None, Some(_)) => {
                    info.target_namespace = expected.clone();
                    info.chameleon = true;
                }
                (d, e) if d == e => {}
                _ => {
                    return Err(invalid(
                        format!(
                            "included schema has target namespace {:?}, expected {:?}",
                            declared, expected
                        ),
                        Some(&info),
                    ))
                }
            },
            Inclusion::Import(expected) => {
                if &declared != expected {
                    return Err(invalid(
                        format!(
                            "imported schema has target namespace {:?}, expected {:?}",
                            declared, expected
                        ),
                        Some(&info),
                    ));
                }
            }
        }

        if let Some(v) = root.get_attribute(attrs::ELEMENT_FORM_DEFAULT) {
            info.element_form = Form::from_str(v)?;
        }
        if let Some(v) = root.get_attribute(attrs::ATTRIBUTE_FORM_DEFAULT) {
            info.attribute_form = Form::from_str(v)?;
        }
        if let Some(v) = root.get_attribute(attrs::BLOCK_DEFAULT) {
            info.block_default = DerivationSet::parse(v)?;
        }
        if let Some(v) = root.get_attribute(attrs::FINAL_DEFAULT) {
            info.final_default = DerivationSet::parse(v)?;
        }
        info.xpath_default_namespace = match root.get_attribute(attrs::XPATH_DEFAULT_NAMESPACE) {
            Some("##targetNamespace") => info.target_namespace.clone(),
            Some("##defaultNamespace") => root.namespaces.get_default_namespace().map(str::to_string),
            Some("##local") | None => None,
            Some(uri) => Some(uri.trim().to_string()),
        };
        Ok(info)
    }

    fn parse_document(
        &mut self,
        doc: &Document,
        location: Option<String>,
        inclusion: Inclusion,
        depth: usize,
    ) -> Result<()> {
        self.limits.check_include_depth(depth)?;
        let root = doc
            .root()
            .ok_or_else(|| invalid("empty schema document", None))?;
        if !is_xsd(root, tags::SCHEMA) {
            return Err(invalid(
                format!("root element {} is not xs:schema", root.qname),
                None,
            ));
        }

        let info = Arc::new(self.source_info(root, location.clone(), &inclusion)?);
        debug!(
            location = %info.label(),
            target_namespace = ?info.target_namespace,
            chameleon = info.chameleon,
            "loaded schema source"
        );
        self.raw.sources_loaded += 1;
        if let Some(location) = &location {
            self.in_progress.push(location.clone());
        }

        let result = self.parse_children(root, &info, depth);

        if location.is_some() {
            self.in_progress.pop();
        }
        result
    }

    fn parse_children(&mut self, root: &Element, info: &Arc<SourceInfo>, depth: usize) -> Result<()> {
        let base = info.location.as_deref();
        for child in &root.children {
            if child.qname.namespace() != Some(XSD_NAMESPACE) {
                continue;
            }
            let outcome = match child.local_name() {
                tags::ANNOTATION | tags::DEFAULT_OPEN_CONTENT => Ok(()),
                tags::INCLUDE => self.parse_include(child, info, depth),
                tags::IMPORT => self.parse_import(child, info, depth),
                tags::REDEFINE => self.parse_redefine(child, info, depth, true),
                tags::OVERRIDE => self.parse_redefine(child, info, depth, false),
                tag => match component_category(tag) {
                    Some(category) => self.register(category, child, info, None),
                    None => Err(invalid(
                        format!("unexpected top-level element xs:{}", tag),
                        Some(info),
                    )),
                },
            };
            if let Err(err) = outcome {
                let err = match err {
                    Error::Schema(e) if e.location.is_none() => {
                        Error::Schema(e.with_location(base.unwrap_or("<inline schema>")))
                    }
                    other => other,
                };
                self.fail(err)?;
            }
        }
        Ok(())
    }

    fn schema_location<'e>(node: &'e Element, info: &SourceInfo) -> Result<&'e str> {
        node.get_attribute(attrs::SCHEMA_LOCATION).ok_or_else(|| {
            invalid(
                format!("xs:{} requires a schemaLocation", node.local_name()),
                Some(info),
            )
        })
    }

    fn parse_include(&mut self, node: &Element, info: &SourceInfo, depth: usize) -> Result<()> {
        let location = Self::schema_location(node, info)?;
        self.load(
            location,
            info.location.as_deref(),
            Inclusion::Include(info.target_namespace.clone()),
            depth + 1,
        )?;
        Ok(())
    }

    fn parse_import(&mut self, node: &Element, info: &SourceInfo, depth: usize) -> Result<()> {
        let namespace = node
            .get_attribute(attrs::NAMESPACE)
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);
        if namespace == info.target_namespace {
            return Err(invalid(
                "xs:import must name a namespace other than the target namespace",
                Some(info),
            ));
        }
        match node.get_attribute(attrs::SCHEMA_LOCATION) {
            Some(location) => {
                self.load(
                    location,
                    info.location.as_deref(),
                    Inclusion::Import(namespace),
                    depth + 1,
                )?;
            }
            None => debug!(namespace = ?namespace, "import without schemaLocation"),
        }
        Ok(())
    }

    /// `redefine` chains new definitions onto the old ones; `override` replaces them
    fn parse_redefine(
        &mut self,
        node: &Element,
        info: &Arc<SourceInfo>,
        depth: usize,
        chain: bool,
    ) -> Result<()> {
        let location = Self::schema_location(node, info)?;
        let resolved = self
            .loader
            .resolve(location, info.location.as_deref())
            .map_err(|e| resource_error(location, e))?;
        if self.in_progress.contains(&resolved) {
            return Err(SchemaError::new(
                SchemaErrorKind::CircularInclusion,
                format!("schema '{}' is redefined while it is still being loaded", resolved),
            )
            .with_location(info.label())
            .into());
        }
        self.load(
            location,
            info.location.as_deref(),
            Inclusion::Include(info.target_namespace.clone()),
            depth + 1,
        )?;

        for child in &node.children {
            if child.qname.namespace() != Some(XSD_NAMESPACE)
                || child.local_name() == tags::ANNOTATION
            {
                continue;
            }
            let category = component_category(child.local_name()).ok_or_else(|| {
                invalid(
                    format!("xs:{} cannot be redefined", child.local_name()),
                    Some(info),
                )
            })?;
            let key = Self::key_of(category, child, info)?;
            let previous = self.raw.components.remove(&key);
            if chain && previous.is_none() {
                return Err(invalid(
                    format!("redefined {} not found in '{}'", key, resolved),
                    Some(info),
                ));
            }
            let redefined = if chain { previous.map(Box::new) } else { None };
            self.register(category, child, info, redefined)?;
        }
        Ok(())
    }

    fn key_of(category: ComponentCategory, node: &Element, info: &SourceInfo) -> Result<ComponentKey> {
        let name = node.get_attribute(attrs::NAME).ok_or_else(|| {
            invalid(
                format!("top-level xs:{} has no name", node.local_name()),
                Some(info),
            )
        })?;
        if !crate::names::is_valid_ncname(name.trim()) {
            return Err(invalid(format!("invalid component name '{}'", name), Some(info)));
        }
        Ok(ComponentKey::new(category, info.qualify(name)))
    }

    fn register(
        &mut self,
        category: ComponentCategory,
        node: &Element,
        info: &Arc<SourceInfo>,
        redefined: Option<Box<RawComponent>>,
    ) -> Result<()> {
        let key = Self::key_of(category, node, info)?;
        if let Some(existing) = self.raw.components.get(&key) {
            return Err(SchemaError::new(
                SchemaErrorKind::DuplicateComponent,
                format!(
                    "{} is already defined in '{}'",
                    key,
                    existing.source.label()
                ),
            )
            .with_location(info.label())
            .with_component(key.name.to_string())
            .into());
        }
        self.limits.check_components(self.raw.components.len() + 1)?;
        self.raw.components.insert(
            key,
            RawComponent {
                source: Arc::clone(info),
                node: node.clone(),
                redefined,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::MemoryLoader;

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn schema(attrs: &str, body: &str) -> String {
        format!("<xs:schema {} {}>{}</xs:schema>", XS, attrs, body)
    }

    fn parse(loader: &MemoryLoader, sources: &[SchemaSource]) -> Result<RawSchema> {
        let limits = Limits::default();
        let mut parser = SourceParser::new(loader, &limits, false);
        for source in sources {
            parser.add_source(source)?;
        }
        Ok(parser.finish())
    }

    fn kind(err: Error) -> Option<SchemaErrorKind> {
        err.as_schema_error().map(|e| e.kind)
    }

    #[test]
    fn test_register_components() {
        let text = schema(
            r#"targetNamespace="urn:t""#,
            r#"<xs:element name="a"/><xs:complexType name="a"/><xs:group name="g"><xs:sequence/></xs:group>"#,
        );
        let raw = parse(&MemoryLoader::new(), &[SchemaSource::text(text)]).unwrap();
        assert_eq!(raw.components.len(), 3);
        assert!(raw.components.contains_key(&ComponentKey::new(
            ComponentCategory::Type,
            QName::namespaced("urn:t", "a")
        )));
    }

    #[test]
    fn test_duplicate_component() {
        let text = schema("", r#"<xs:element name="a"/><xs:element name="a"/>"#);
        let err = parse(&MemoryLoader::new(), &[SchemaSource::text(text)]).unwrap_err();
        assert_eq!(kind(err), Some(SchemaErrorKind::DuplicateComponent));
    }

    #[test]
    fn test_mutual_include_visits_each_once() {
        let loader = MemoryLoader::new()
            .with_resource(
                "a.xsd",
                schema("", r#"<xs:include schemaLocation="b.xsd"/><xs:element name="a"/>"#),
            )
            .with_resource(
                "b.xsd",
                schema("", r#"<xs:include schemaLocation="a.xsd"/><xs:element name="b"/>"#),
            );
        let raw = parse(&loader, &[SchemaSource::location("a.xsd")]).unwrap();
        assert_eq!(raw.sources_loaded, 2);
        assert_eq!(raw.components.len(), 2);
    }

    #[test]
    fn test_chameleon_include() {
        let loader = MemoryLoader::new().with_resource(
            "types.xsd",
            schema("", r#"<xs:simpleType name="code"><xs:restriction base="xs:string"/></xs:simpleType>"#),
        );
        let main = schema(
            r#"targetNamespace="urn:main""#,
            r#"<xs:include schemaLocation="types.xsd"/>"#,
        );
        let raw = parse(&loader, &[SchemaSource::named("main.xsd", main)]).unwrap();
        let key = ComponentKey::new(ComponentCategory::Type, QName::namespaced("urn:main", "code"));
        let component = raw.components.get(&key).unwrap();
        assert!(component.source.chameleon);
        let resolved = component
            .source
            .resolve_qname(&component.node, "code")
            .unwrap();
        assert_eq!(resolved, QName::namespaced("urn:main", "code"));
    }

    #[test]
    fn test_import_namespace_mismatch() {
        let loader = MemoryLoader::new().with_resource(
            "other.xsd",
            schema(r#"targetNamespace="urn:wrong""#, ""),
        );
        let main = schema(
            "",
            r#"<xs:import namespace="urn:other" schemaLocation="other.xsd"/>"#,
        );
        let err = parse(&loader, &[SchemaSource::named("main.xsd", main)]).unwrap_err();
        assert_eq!(kind(err), Some(SchemaErrorKind::InvalidComponent));
    }

    #[test]
    fn test_missing_resource_is_wrapped() {
        let main = schema("", r#"<xs:include schemaLocation="missing.xsd"/>"#);
        let err = parse(&MemoryLoader::new(), &[SchemaSource::named("main.xsd", main)]).unwrap_err();
        assert_eq!(kind(err), Some(SchemaErrorKind::Resource));
    }

    #[test]
    fn test_redefine_chains_previous_definition() {
        let loader = MemoryLoader::new().with_resource(
            "base.xsd",
            schema("", r#"<xs:complexType name="T"><xs:sequence/></xs:complexType>"#),
        );
        let main = schema(
            "",
            r#"<xs:redefine schemaLocation="base.xsd">
                 <xs:complexType name="T"><xs:complexContent><xs:extension base="T"/></xs:complexContent></xs:complexType>
               </xs:redefine>"#,
        );
        let raw = parse(&loader, &[SchemaSource::named("main.xsd", main)]).unwrap();
        let key = ComponentKey::new(ComponentCategory::Type, QName::local("T"));
        let component = raw.components.get(&key).unwrap();
        assert!(component.at_level(1).is_some());
        assert!(component.at_level(2).is_none());
    }

    #[test]
    fn test_circular_redefine() {
        let loader = MemoryLoader::new()
            .with_resource(
                "a.xsd",
                schema("", r#"<xs:redefine schemaLocation="b.xsd"/>"#),
            )
            .with_resource(
                "b.xsd",
                schema("", r#"<xs:redefine schemaLocation="a.xsd"/>"#),
            );
        let err = parse(&loader, &[SchemaSource::location("a.xsd")]).unwrap_err();
        assert_eq!(kind(err), Some(SchemaErrorKind::CircularInclusion));
    }

    #[test]
    fn test_lax_collects_errors() {
        let text = schema("", r#"<xs:element name="a"/><xs:element name="a"/><xs:bogus/>"#);
        let limits = Limits::default();
        let loader = MemoryLoader::new();
        let mut parser = SourceParser::new(&loader, &limits, true);
        parser.add_source(&SchemaSource::text(text)).unwrap();
        let raw = parser.finish();
        assert_eq!(raw.errors.len(), 2);
        assert_eq!(raw.components.len(), 1);
    }
}
