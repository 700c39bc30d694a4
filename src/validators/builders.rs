//! Component builders
//!
//! The build phase turns the raw top-level declarations collected by the
//! parser into a [`ComponentTable`]. Global components are resolved on
//! demand and memoized per `(category, name, redefinition level)`. A slot is
//! reserved before its body is built, so recursive content can point at the
//! component being built; deriving through a reserved slot is a cycle.
//!
//! Once every global is resolved a few passes finish the table:
//!
//! 1. group self-containment is rejected;
//! 2. substitution groups are closed transitively and filtered by
//!    `final`/`block`;
//! 3. keyrefs are linked to their key or unique;
//! 4. default and fixed values are checked against their types;
//! 5. complex restrictions are checked position by position;
//! 6. content models are compiled into automata.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::documents::Element;
use crate::error::{Error, Result, SchemaError, SchemaErrorKind};
use crate::limits::Limits;
use crate::namespaces::{QName, XSD_NAMESPACE};
use crate::xpath::XPathSelector;

use super::attributes::{AttributeDecl, AttributeGroupDef, AttributeUse, Use, ValueConstraint};
use super::base::{
    AttributeGroupId, AttributeId, ComponentCategory, ComponentKey, DerivationMethod,
    DerivationSet, ElementId, Form, GroupId, IdentityId, TypeId,
};
use super::builtins::builtin_types;
use super::complex_types::{ComplexTypeDef, ContentType};
use super::elements::ElementDecl;
use super::facets::{Facet, FacetKind};
use super::globals::{ComponentRef, ComponentTable, Notation, TypeDef, ANY_SIMPLE_TYPE, ANY_TYPE};
use super::groups::{Compositor, GroupDef, ModelGroup};
use super::identities::{IdentityConstraint, IdentityKind};
use super::models::ContentModel;
use super::parsing::{
    is_xsd, xsd_attrs as attrs, xsd_elements as tags, RawComponent, RawSchema, SourceInfo,
};
use super::particles::{parse_occurs, Occurs, Particle, Term};
use super::simple_types::{SimpleTypeDef, SimpleTypeLookup, Variety};
use super::values::{Primitive, SimpleValue};
use super::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};

/// XSD language version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum XsdVersion {
    /// XSD 1.0
    #[default]
    #[serde(rename = "1.0")]
    V10,
    /// XSD 1.1
    #[serde(rename = "1.1")]
    V11,
}

impl XsdVersion {
    /// Parse from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.0" => Ok(XsdVersion::V10),
            "1.1" => Ok(XsdVersion::V11),
            _ => Err(Error::Value(format!(
                "Invalid XSD version: '{}'. Must be '1.0' or '1.1'",
                s
            ))),
        }
    }

    /// Get as string
    pub fn as_str(&self) -> &'static str {
        match self {
            XsdVersion::V10 => "1.0",
            XsdVersion::V11 => "1.1",
        }
    }
}

impl fmt::Display for XsdVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the component table from parsed sources
///
/// Returns the table and the errors recovered from in lax compile mode.
pub(crate) fn build(
    raw: &RawSchema,
    version: XsdVersion,
    limits: &Limits,
    lax: bool,
) -> Result<(ComponentTable, Vec<SchemaError>)> {
    SchemaBuilder::new(raw, version, limits, lax)?.build()
}

/// How a reference uses its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    /// Base type, list item or union member: the target must be complete
    Derivation,
    /// Element or attribute type, group reference: a reserved slot will do
    Reference,
    /// Top-level pass over every global
    Global,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Handle given out to a type reference, body not built yet
    Reserved(ComponentRef),
    InProgress(ComponentRef),
    Done(ComponentRef),
}

/// Where a default or fixed value lives
#[derive(Debug, Clone, Copy)]
enum ConstraintSite {
    Element(usize),
    Attribute(usize),
    TypeUse(usize, usize),
    GroupUse(usize, usize),
}

fn schema_error(kind: SchemaErrorKind, message: impl Into<String>) -> Error {
    SchemaError::new(kind, message).into()
}

fn invalid(message: impl Into<String>) -> Error {
    schema_error(SchemaErrorKind::InvalidComponent, message)
}

fn xsd_children(node: &Element) -> impl Iterator<Item = &Element> {
    node.children
        .iter()
        .filter(|c| c.namespace() == Some(XSD_NAMESPACE) && c.local_name() != tags::ANNOTATION)
}

fn xsd_child<'n>(node: &'n Element, local: &str) -> Option<&'n Element> {
    node.children.iter().find(|c| is_xsd(c, local))
}

fn required_attr<'n>(node: &'n Element, name: &str) -> Result<&'n str> {
    node.get_attribute(name).ok_or_else(|| {
        invalid(format!(
            "<{}> requires a '{}' attribute",
            node.local_name(),
            name
        ))
    })
}

fn bool_attr(node: &Element, name: &str) -> Result<Option<bool>> {
    match node.get_attribute(name).map(str::trim) {
        None => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(Error::Value(format!(
            "'{}' is not a valid boolean for attribute '{}'",
            other, name
        ))),
    }
}

fn derivation_set(node: &Element, name: &str, default: DerivationSet) -> Result<DerivationSet> {
    match node.get_attribute(name) {
        Some(value) => DerivationSet::parse(value),
        None => Ok(default),
    }
}

fn read_facets(node: &Element) -> Result<Vec<Facet>> {
    let mut facets = Vec::new();
    for child in xsd_children(node) {
        if let Some(kind) = FacetKind::from_name(child.local_name()) {
            facets.push(Facet {
                kind,
                value: required_attr(child, attrs::VALUE)?.to_string(),
                fixed: bool_attr(child, attrs::FIXED)?.unwrap_or(false),
            });
        }
    }
    Ok(facets)
}

/// A sequence or all group holding nothing but other such groups
fn is_vacuous(group: &ModelGroup) -> bool {
    group.compositor != Compositor::Choice
        && group
            .particles
            .iter()
            .all(|p| matches!(&p.term, Term::Model(g) if is_vacuous(g)))
}

fn content_type(group: Option<ModelGroup>, mixed: bool) -> ContentType {
    match group {
        Some(g) if !is_vacuous(&g) => {
            if mixed {
                ContentType::Mixed(g)
            } else {
                ContentType::ElementOnly(g)
            }
        }
        _ if mixed => ContentType::Mixed(ModelGroup::empty()),
        _ => ContentType::Empty,
    }
}

fn fallback_simple(name: QName) -> SimpleTypeDef {
    let mut def = SimpleTypeDef::primitive(name, ANY_SIMPLE_TYPE, Primitive::AnySimple);
    def.builtin = false;
    def
}

fn fallback_complex(name: QName) -> ComplexTypeDef {
    let mut def = ComplexTypeDef::any_type(ANY_TYPE);
    def.name = Some(name);
    def
}

fn lax_any_group() -> ModelGroup {
    ModelGroup::new(
        Compositor::Sequence,
        vec![Particle::new(
            Term::Wildcard(Wildcard::any(ProcessContents::Lax)),
            Occurs::zero_or_more(),
        )],
    )
}

/// Resolves raw declarations into the component table
pub(crate) struct SchemaBuilder<'r> {
    raw: &'r RawSchema,
    version: XsdVersion,
    limits: &'r Limits,
    lax: bool,
    table: ComponentTable,
    slots: HashMap<(ComponentKey, usize), Slot>,
    /// Redefinition level that references to a key currently resolve to
    shadow: HashMap<ComponentKey, usize>,
    identity_names: BTreeMap<QName, IdentityId>,
    /// Types referenced by elements or attributes and built after the top-level pass
    deferred: Vec<(ComponentKey, usize)>,
    errors: Vec<SchemaError>,
    nesting: usize,
}

impl<'r> SchemaBuilder<'r> {
    pub(crate) fn new(
        raw: &'r RawSchema,
        version: XsdVersion,
        limits: &'r Limits,
        lax: bool,
    ) -> Result<Self> {
        let mut table = ComponentTable {
            version,
            types: vec![TypeDef::Complex(ComplexTypeDef::any_type(ANY_TYPE))],
            elements: Vec::new(),
            attributes: Vec::new(),
            groups: Vec::new(),
            attribute_groups: Vec::new(),
            identities: Vec::new(),
            notations: BTreeMap::new(),
            globals: BTreeMap::new(),
            substitutions: BTreeMap::new(),
        };
        table.types.extend(
            builtin_types(version, ANY_TYPE, 1)?
                .into_iter()
                .map(TypeDef::Simple),
        );

        let mut slots = HashMap::new();
        for (index, def) in table.types.iter().enumerate() {
            if let Some(name) = def.name() {
                let key = ComponentKey::new(ComponentCategory::Type, name.clone());
                let handle = ComponentRef::Type(TypeId::new(index));
                table.globals.insert(key.clone(), handle);
                slots.insert((key, 0), Slot::Done(handle));
            }
        }

        Ok(Self {
            raw,
            version,
            limits,
            lax,
            table,
            slots,
            shadow: HashMap::new(),
            identity_names: BTreeMap::new(),
            deferred: Vec::new(),
            errors: Vec::new(),
            nesting: 0,
        })
    }

    pub(crate) fn build(mut self) -> Result<(ComponentTable, Vec<SchemaError>)> {
        let raw = self.raw;
        for key in raw.components.keys() {
            if key.category != ComponentCategory::IdentityConstraint {
                self.resolve(key, Usage::Global)?;
            }
        }
        self.build_deferred()?;

        self.check_group_cycles()?;
        self.link_substitution_groups()?;
        self.link_identities()?;
        self.check_value_constraints()?;
        self.check_restrictions()?;
        self.compile_models()?;
        self.limits.check_components(self.component_count())?;

        debug!(
            types = self.table.types.len(),
            elements = self.table.elements.len(),
            attributes = self.table.attributes.len(),
            groups = self.table.groups.len(),
            attribute_groups = self.table.attribute_groups.len(),
            identities = self.table.identities.len(),
            errors = raw.errors.len() + self.errors.len(),
            "component table frozen"
        );

        let mut errors = raw.errors.clone();
        errors.append(&mut self.errors);
        Ok((self.table, errors))
    }

    fn component_count(&self) -> usize {
        self.table.types.len()
            + self.table.elements.len()
            + self.table.attributes.len()
            + self.table.groups.len()
            + self.table.attribute_groups.len()
            + self.table.identities.len()
    }

    fn reserve_room(&self) -> Result<()> {
        self.limits.check_components(self.component_count() + 1)
    }

    fn push_type(&mut self, def: TypeDef) -> Result<TypeId> {
        self.reserve_room()?;
        self.table.types.push(def);
        Ok(TypeId::new(self.table.types.len() - 1))
    }

    fn push_element(&mut self, decl: ElementDecl) -> Result<ElementId> {
        self.reserve_room()?;
        self.table.elements.push(decl);
        Ok(ElementId::new(self.table.elements.len() - 1))
    }

    fn push_attribute(&mut self, decl: AttributeDecl) -> Result<AttributeId> {
        self.reserve_room()?;
        self.table.attributes.push(decl);
        Ok(AttributeId::new(self.table.attributes.len() - 1))
    }

    fn nested<T>(&mut self, build: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.nesting += 1;
        let result = match self.limits.check_depth(self.nesting) {
            Ok(()) => build(self),
            Err(err) => Err(err),
        };
        self.nesting -= 1;
        result
    }

    fn require_v11(&self, feature: &str) -> Result<()> {
        match self.version {
            XsdVersion::V11 => Ok(()),
            XsdVersion::V10 => Err(invalid(format!("{} requires XSD 1.1", feature))),
        }
    }

    /// Record a recoverable error, or fail in strict compile mode
    fn report(&mut self, error: SchemaError) -> Result<()> {
        if self.lax {
            warn!(error = %error, "schema error recovered in lax compile mode");
            self.errors.push(error);
            Ok(())
        } else {
            Err(error.into())
        }
    }

    fn recover(&mut self, err: Error, key: &ComponentKey, raw: &RawComponent) -> Result<()> {
        let mut error = match err {
            Error::Schema(e) => e,
            Error::LimitExceeded(_) => return Err(err),
            other => SchemaError::new(SchemaErrorKind::InvalidComponent, other.to_string()),
        };
        if error.component.is_none() {
            error = error.with_component(key.name.to_string());
        }
        if error.location.is_none() {
            error = error.with_location(raw.source.label());
        }
        self.report(error)
    }

    // Global resolution

    fn resolve(&mut self, key: &ComponentKey, usage: Usage) -> Result<ComponentRef> {
        let level = self.shadow.get(key).copied().unwrap_or(0);
        let slot_key = (key.clone(), level);
        match self.slots.get(&slot_key).copied() {
            Some(Slot::Done(handle)) => return Ok(handle),
            Some(Slot::InProgress(handle)) => {
                let cyclic = usage == Usage::Derivation
                    || key.category == ComponentCategory::AttributeGroup;
                if cyclic {
                    return Err(schema_error(
                        SchemaErrorKind::UnresolvableDerivation,
                        format!("circular definition of {} {}", key.category, key.name),
                    ));
                }
                return Ok(handle);
            }
            Some(Slot::Reserved(handle)) => {
                if usage == Usage::Reference {
                    return Ok(handle);
                }
                return self.build_slot(key, level, handle);
            }
            None => {}
        }

        let component = self.raw_component(key, level)?;
        trace!(component = %key, level, "resolving component");
        let handle = self.reserve(key, component)?;
        if level == 0 {
            self.table.globals.insert(key.clone(), handle);
        }

        // Element and attribute types are built after the top-level pass.
        if usage == Usage::Reference && key.category == ComponentCategory::Type {
            self.slots.insert(slot_key, Slot::Reserved(handle));
            self.deferred.push((key.clone(), level));
            return Ok(handle);
        }
        self.build_slot(key, level, handle)
    }

    fn raw_component(&self, key: &ComponentKey, level: usize) -> Result<&'r RawComponent> {
        let raw: &'r RawSchema = self.raw;
        raw.components
            .get(key)
            .and_then(|c| c.at_level(level))
            .ok_or_else(|| {
                schema_error(
                    SchemaErrorKind::UnresolvedReference,
                    format!("{} {} not found", key.category, key.name),
                )
            })
    }

    fn build_slot(
        &mut self,
        key: &ComponentKey,
        level: usize,
        handle: ComponentRef,
    ) -> Result<ComponentRef> {
        let component = self.raw_component(key, level)?;
        let slot_key = (key.clone(), level);
        self.slots.insert(slot_key.clone(), Slot::InProgress(handle));

        let previous = self.shadow.get(key).copied();
        if component.redefined.is_some() {
            self.shadow.insert(key.clone(), level + 1);
        }
        let built = self.build_global(key, component, handle);
        match previous {
            Some(l) => {
                self.shadow.insert(key.clone(), l);
            }
            None => {
                self.shadow.remove(key);
            }
        }

        if let Err(err) = built {
            self.recover(err, key, component)?;
            self.install_fallback(key, component, handle);
        }
        self.slots.insert(slot_key, Slot::Done(handle));
        Ok(handle)
    }

    fn build_deferred(&mut self) -> Result<()> {
        while let Some((key, level)) = self.deferred.pop() {
            if let Some(Slot::Reserved(handle)) = self.slots.get(&(key.clone(), level)).copied() {
                self.build_slot(&key, level, handle)?;
            }
        }
        Ok(())
    }

    fn reserve(&mut self, key: &ComponentKey, raw: &RawComponent) -> Result<ComponentRef> {
        let name = key.name.clone();
        Ok(match key.category {
            ComponentCategory::Type => {
                let placeholder = if is_xsd(&raw.node, tags::SIMPLE_TYPE) {
                    TypeDef::Simple(fallback_simple(name))
                } else {
                    TypeDef::Complex(fallback_complex(name))
                };
                ComponentRef::Type(self.push_type(placeholder)?)
            }
            ComponentCategory::Element => {
                let mut decl = ElementDecl::new(name, ANY_TYPE);
                decl.global = true;
                ComponentRef::Element(self.push_element(decl)?)
            }
            ComponentCategory::Attribute => ComponentRef::Attribute(self.push_attribute(
                AttributeDecl {
                    name,
                    type_id: ANY_SIMPLE_TYPE,
                    value_constraint: None,
                    global: true,
                },
            )?),
            ComponentCategory::Group => {
                self.reserve_room()?;
                self.table.groups.push(GroupDef {
                    name,
                    model: ModelGroup::empty(),
                });
                ComponentRef::Group(GroupId::new(self.table.groups.len() - 1))
            }
            ComponentCategory::AttributeGroup => {
                self.reserve_room()?;
                self.table.attribute_groups.push(AttributeGroupDef {
                    name: Some(name),
                    ..AttributeGroupDef::default()
                });
                ComponentRef::AttributeGroup(AttributeGroupId::new(
                    self.table.attribute_groups.len() - 1,
                ))
            }
            ComponentCategory::Notation => ComponentRef::Notation,
            ComponentCategory::IdentityConstraint => {
                return Err(invalid(format!(
                    "identity constraint {} is not a top-level component",
                    key.name
                )))
            }
        })
    }

    fn build_global(
        &mut self,
        key: &ComponentKey,
        raw: &RawComponent,
        handle: ComponentRef,
    ) -> Result<()> {
        let node = &raw.node;
        let src: &SourceInfo = &raw.source;
        match handle {
            ComponentRef::Type(id) => {
                let def = if is_xsd(node, tags::SIMPLE_TYPE) {
                    TypeDef::Simple(self.simple_type(node, src, Some(key.name.clone()))?)
                } else {
                    TypeDef::Complex(self.complex_type(node, src, Some(key.name.clone()))?)
                };
                self.table.types[id.index()] = def;
            }
            ComponentRef::Element(id) => {
                let decl = self.element_decl(node, src, key.name.clone(), true)?;
                self.table.elements[id.index()] = decl;
            }
            ComponentRef::Attribute(id) => {
                let decl = self.attribute_decl(node, src, key.name.clone(), true)?;
                self.table.attributes[id.index()] = decl;
            }
            ComponentRef::Group(id) => {
                let body = xsd_children(node).next().ok_or_else(|| {
                    invalid(format!("group {} needs a sequence, choice or all", key.name))
                })?;
                let model = self.model_group(body, src)?;
                self.table.groups[id.index()].model = model;
            }
            ComponentRef::AttributeGroup(id) => {
                let (uses, wildcard) = self.attribute_uses(node, src)?;
                let group = &mut self.table.attribute_groups[id.index()];
                group.uses = uses;
                group.wildcard = wildcard;
            }
            ComponentRef::Notation => {
                let notation = Notation {
                    name: key.name.clone(),
                    public: node.get_attribute(attrs::PUBLIC).map(str::to_string),
                    system: node.get_attribute(attrs::SYSTEM).map(str::to_string),
                };
                self.table.notations.insert(key.name.clone(), notation);
            }
            ComponentRef::Identity(_) => {}
        }
        Ok(())
    }

    fn install_fallback(&mut self, key: &ComponentKey, raw: &RawComponent, handle: ComponentRef) {
        let name = key.name.clone();
        match handle {
            ComponentRef::Type(id) => {
                self.table.types[id.index()] = if is_xsd(&raw.node, tags::SIMPLE_TYPE) {
                    TypeDef::Simple(fallback_simple(name))
                } else {
                    TypeDef::Complex(fallback_complex(name))
                };
            }
            ComponentRef::Element(id) => {
                let mut decl = ElementDecl::new(name, ANY_TYPE);
                decl.global = true;
                self.table.elements[id.index()] = decl;
            }
            ComponentRef::Attribute(id) => {
                self.table.attributes[id.index()] = AttributeDecl {
                    name,
                    type_id: ANY_SIMPLE_TYPE,
                    value_constraint: None,
                    global: true,
                };
            }
            ComponentRef::Group(id) => self.table.groups[id.index()].model = lax_any_group(),
            ComponentRef::AttributeGroup(id) => {
                let group = &mut self.table.attribute_groups[id.index()];
                group.uses.clear();
                group.wildcard = Some(Wildcard::any(ProcessContents::Lax));
            }
            ComponentRef::Notation => {
                self.table.notations.insert(
                    name.clone(),
                    Notation {
                        name,
                        public: None,
                        system: None,
                    },
                );
            }
            ComponentRef::Identity(_) => {}
        }
    }

    fn type_ref(&mut self, name: &QName, usage: Usage) -> Result<TypeId> {
        let key = ComponentKey::new(ComponentCategory::Type, name.clone());
        match self.resolve(&key, usage)? {
            ComponentRef::Type(id) => Ok(id),
            _ => Err(invalid(format!("{} is not a type", name))),
        }
    }

    fn element_ref(&mut self, name: &QName) -> Result<ElementId> {
        let key = ComponentKey::new(ComponentCategory::Element, name.clone());
        match self.resolve(&key, Usage::Reference)? {
            ComponentRef::Element(id) => Ok(id),
            _ => Err(invalid(format!("{} is not an element", name))),
        }
    }

    fn attribute_ref(&mut self, name: &QName) -> Result<AttributeId> {
        let key = ComponentKey::new(ComponentCategory::Attribute, name.clone());
        match self.resolve(&key, Usage::Reference)? {
            ComponentRef::Attribute(id) => Ok(id),
            _ => Err(invalid(format!("{} is not an attribute", name))),
        }
    }

    fn group_ref(&mut self, name: &QName) -> Result<GroupId> {
        let key = ComponentKey::new(ComponentCategory::Group, name.clone());
        match self.resolve(&key, Usage::Reference)? {
            ComponentRef::Group(id) => Ok(id),
            _ => Err(invalid(format!("{} is not a model group", name))),
        }
    }

    fn attribute_group_ref(&mut self, name: &QName) -> Result<AttributeGroupId> {
        let key = ComponentKey::new(ComponentCategory::AttributeGroup, name.clone());
        match self.resolve(&key, Usage::Reference)? {
            ComponentRef::AttributeGroup(id) => Ok(id),
            _ => Err(invalid(format!("{} is not an attribute group", name))),
        }
    }

    // Simple types

    fn simple_type(
        &mut self,
        node: &Element,
        src: &SourceInfo,
        name: Option<QName>,
    ) -> Result<SimpleTypeDef> {
        let final_ = derivation_set(node, attrs::FINAL, src.final_default)?;
        let body = xsd_children(node)
            .next()
            .ok_or_else(|| invalid("a simple type needs a restriction, list or union"))?;
        let mut def = match body.local_name() {
            tags::RESTRICTION => {
                let base_id = self.simple_base(body, src, attrs::BASE)?;
                let facets = read_facets(body)?;
                let base = self.simple_def(base_id, "base type")?;
                SimpleTypeDef::restrict(
                    name,
                    base_id,
                    base,
                    &facets,
                    Some(&body.namespaces),
                    &self.table,
                )?
            }
            tags::LIST => {
                let item_id = self.simple_base(body, src, attrs::ITEM_TYPE)?;
                let item = self.simple_def(item_id, "list item type")?;
                if matches!(item.variety, Variety::List(_)) {
                    return Err(invalid(format!(
                        "list item type {} is itself a list",
                        item.display_name()
                    )));
                }
                if item.final_.list {
                    return Err(schema_error(
                        SchemaErrorKind::InvalidRestriction,
                        format!("type {} is final for list", item.display_name()),
                    ));
                }
                SimpleTypeDef::list(name, ANY_SIMPLE_TYPE, item_id)
            }
            tags::UNION => {
                let mut members = Vec::new();
                if let Some(list) = body.get_attribute(attrs::MEMBER_TYPES) {
                    for token in list.split_whitespace() {
                        let qname = src.resolve_qname(body, token)?;
                        members.push(self.type_ref(&qname, Usage::Derivation)?);
                    }
                }
                for inline in xsd_children(body).filter(|c| c.local_name() == tags::SIMPLE_TYPE) {
                    members.push(self.anonymous_simple_type(inline, src)?);
                }
                if members.is_empty() {
                    return Err(invalid("a union needs at least one member type"));
                }
                for member in &members {
                    let def = self.simple_def(*member, "union member type")?;
                    if def.final_.union {
                        return Err(schema_error(
                            SchemaErrorKind::InvalidRestriction,
                            format!("type {} is final for union", def.display_name()),
                        ));
                    }
                }
                SimpleTypeDef::union(name, ANY_SIMPLE_TYPE, members)
            }
            other => {
                return Err(invalid(format!(
                    "unexpected <{}> in a simple type definition",
                    other
                )))
            }
        };
        def.final_ = final_;
        Ok(def)
    }

    fn simple_base(&mut self, body: &Element, src: &SourceInfo, attr: &str) -> Result<TypeId> {
        match body.get_attribute(attr) {
            Some(value) => {
                let qname = src.resolve_qname(body, value)?;
                self.type_ref(&qname, Usage::Derivation)
            }
            None => match xsd_child(body, tags::SIMPLE_TYPE) {
                Some(inline) => self.anonymous_simple_type(inline, src),
                None => Err(invalid(format!(
                    "<{}> needs a '{}' attribute or an inline simple type",
                    body.local_name(),
                    attr
                ))),
            },
        }
    }

    fn simple_def(&self, id: TypeId, role: &str) -> Result<&SimpleTypeDef> {
        self.table.simple_type(id).ok_or_else(|| {
            invalid(format!(
                "{} {} is not a simple type",
                role,
                self.table.type_def(id).display_name()
            ))
        })
    }

    fn anonymous_simple_type(&mut self, node: &Element, src: &SourceInfo) -> Result<TypeId> {
        self.nested(|b| {
            let def = b.simple_type(node, src, None)?;
            b.push_type(TypeDef::Simple(def))
        })
    }

    // Complex types

    fn anonymous_complex_type(&mut self, node: &Element, src: &SourceInfo) -> Result<TypeId> {
        self.nested(|b| {
            let def = b.complex_type(node, src, None)?;
            b.push_type(TypeDef::Complex(def))
        })
    }

    fn complex_type(
        &mut self,
        node: &Element,
        src: &SourceInfo,
        name: Option<QName>,
    ) -> Result<ComplexTypeDef> {
        let mut ty = ComplexTypeDef::empty(ANY_TYPE);
        ty.name = name;
        ty.is_abstract = bool_attr(node, attrs::ABSTRACT)?.unwrap_or(false);
        ty.block = derivation_set(node, attrs::BLOCK, src.block_default)?;
        ty.final_ = derivation_set(node, attrs::FINAL, src.final_default)?;
        let mixed = bool_attr(node, attrs::MIXED)?;

        let content = xsd_children(node).find(|c| {
            matches!(c.local_name(), tags::SIMPLE_CONTENT | tags::COMPLEX_CONTENT)
        });
        match content {
            Some(sc) if sc.local_name() == tags::SIMPLE_CONTENT => {
                self.simple_content(&mut ty, sc, src)?
            }
            Some(cc) => self.complex_content(&mut ty, cc, src, mixed)?,
            None => {
                let group = self.content_particle(node, src)?;
                ty.content = content_type(group, mixed.unwrap_or(false));
                let (uses, wildcard) = self.attribute_uses(node, src)?;
                ty.attributes = uses.into_iter().filter(|(_, u)| !u.is_prohibited()).collect();
                ty.attribute_wildcard = wildcard;
            }
        }
        Ok(ty)
    }

    fn derivation_body<'n>(node: &'n Element) -> Result<&'n Element> {
        xsd_children(node)
            .find(|c| matches!(c.local_name(), tags::RESTRICTION | tags::EXTENSION))
            .ok_or_else(|| {
                invalid(format!(
                    "<{}> needs a restriction or an extension",
                    node.local_name()
                ))
            })
    }

    fn simple_content(
        &mut self,
        ty: &mut ComplexTypeDef,
        node: &Element,
        src: &SourceInfo,
    ) -> Result<()> {
        let body = Self::derivation_body(node)?;
        let base_name = src.resolve_qname(body, required_attr(body, attrs::BASE)?)?;
        let base_id = self.type_ref(&base_name, Usage::Derivation)?;
        let base_def = self.table.type_def(base_id).clone();
        ty.base = base_id;

        if body.local_name() == tags::EXTENSION {
            ty.derivation = DerivationMethod::Extension;
            if base_def.final_set().extension {
                return Err(schema_error(
                    SchemaErrorKind::InvalidExtension,
                    format!("type {} is final for extension", base_def.display_name()),
                ));
            }
            match &base_def {
                TypeDef::Simple(_) => ty.content = ContentType::Simple(base_id),
                TypeDef::Complex(base) => match &base.content {
                    ContentType::Simple(st) => {
                        ty.content = ContentType::Simple(*st);
                        ty.attributes = base.attributes.clone();
                        ty.attribute_wildcard = base.attribute_wildcard.clone();
                    }
                    other => {
                        return Err(schema_error(
                            SchemaErrorKind::InvalidExtension,
                            format!(
                                "simple content cannot extend {}, which has {} content",
                                base.display_name(),
                                other.kind_name()
                            ),
                        ))
                    }
                },
            }
            let (uses, wildcard) = self.attribute_uses(body, src)?;
            return self.extend_attributes(ty, uses, wildcard);
        }

        ty.derivation = DerivationMethod::Restriction;
        let base = match &base_def {
            TypeDef::Complex(base) => base,
            TypeDef::Simple(s) => {
                return Err(schema_error(
                    SchemaErrorKind::InvalidRestriction,
                    format!(
                        "simple content restriction needs a complex base, {} is simple",
                        s.display_name()
                    ),
                ))
            }
        };
        if base.final_.restriction {
            return Err(schema_error(
                SchemaErrorKind::InvalidRestriction,
                format!("type {} is final for restriction", base.display_name()),
            ));
        }
        let inline = match xsd_child(body, tags::SIMPLE_TYPE) {
            Some(node) => Some(self.anonymous_simple_type(node, src)?),
            None => None,
        };
        let content_base = match (&base.content, inline) {
            (ContentType::Simple(st), Some(own)) => {
                if !self.table.is_derived_from(own, *st) {
                    return Err(schema_error(
                        SchemaErrorKind::InvalidRestriction,
                        "the inline simple type does not derive from the base content type",
                    ));
                }
                own
            }
            (ContentType::Simple(st), None) => *st,
            (ContentType::Mixed(g), Some(own)) if g.is_emptiable(&self.table) => own,
            (other, _) => {
                return Err(schema_error(
                    SchemaErrorKind::InvalidRestriction,
                    format!(
                        "{} has {} content and cannot be restricted to simple content",
                        base.display_name(),
                        other.kind_name()
                    ),
                ))
            }
        };
        let facets = read_facets(body)?;
        let content = if facets.is_empty() {
            content_base
        } else {
            let base_simple = self.simple_def(content_base, "simple content type")?;
            let def = SimpleTypeDef::restrict(
                None,
                content_base,
                base_simple,
                &facets,
                Some(&body.namespaces),
                &self.table,
            )?;
            self.push_type(TypeDef::Simple(def))?
        };
        ty.content = ContentType::Simple(content);
        let (uses, wildcard) = self.attribute_uses(body, src)?;
        self.restrict_attributes(ty, base, uses, wildcard)
    }

    fn complex_content(
        &mut self,
        ty: &mut ComplexTypeDef,
        node: &Element,
        src: &SourceInfo,
        mixed: Option<bool>,
    ) -> Result<()> {
        let mixed = bool_attr(node, attrs::MIXED)?.or(mixed).unwrap_or(false);
        let body = Self::derivation_body(node)?;
        let base_name = src.resolve_qname(body, required_attr(body, attrs::BASE)?)?;
        let base_id = self.type_ref(&base_name, Usage::Derivation)?;
        let base = match self.table.type_def(base_id) {
            TypeDef::Complex(base) => base.clone(),
            TypeDef::Simple(s) => {
                return Err(invalid(format!(
                    "complex content cannot derive from simple type {}",
                    s.display_name()
                )))
            }
        };
        ty.base = base_id;
        let own = self.content_particle(body, src)?;
        let (uses, wildcard) = self.attribute_uses(body, src)?;

        if body.local_name() == tags::EXTENSION {
            ty.derivation = DerivationMethod::Extension;
            if base.final_.extension {
                return Err(schema_error(
                    SchemaErrorKind::InvalidExtension,
                    format!("type {} is final for extension", base.display_name()),
                ));
            }
            ty.content = Self::extend_content(&base, base_id, own, mixed)?;
            if base_id != ANY_TYPE {
                ty.attributes = base.attributes.clone();
                ty.attribute_wildcard = base.attribute_wildcard.clone();
            }
            self.extend_attributes(ty, uses, wildcard)
        } else {
            ty.derivation = DerivationMethod::Restriction;
            if base.final_.restriction {
                return Err(schema_error(
                    SchemaErrorKind::InvalidRestriction,
                    format!("type {} is final for restriction", base.display_name()),
                ));
            }
            ty.content = content_type(own, mixed);
            if ty.content.is_mixed() && !base.content.is_mixed() {
                return Err(schema_error(
                    SchemaErrorKind::InvalidRestriction,
                    format!(
                        "mixed content cannot restrict the {} content of {}",
                        base.content.kind_name(),
                        base.display_name()
                    ),
                ));
            }
            self.restrict_attributes(ty, &base, uses, wildcard)
        }
    }

    /// Base content followed by the extension's own particle
    fn extend_content(
        base: &ComplexTypeDef,
        base_id: TypeId,
        own: Option<ModelGroup>,
        mixed: bool,
    ) -> Result<ContentType> {
        let own = own.filter(|g| !is_vacuous(g));
        if base_id == ANY_TYPE {
            return Ok(content_type(own, mixed));
        }
        match (&base.content, own) {
            (ContentType::Simple(_), Some(_)) => Err(schema_error(
                SchemaErrorKind::InvalidExtension,
                format!(
                    "cannot add element content to {}, which has simple content",
                    base.display_name()
                ),
            )),
            (ContentType::Simple(st), None) => Ok(ContentType::Simple(*st)),
            (ContentType::Empty, own) => Ok(content_type(own, mixed)),
            (content, None) => Ok(content.clone()),
            (ContentType::ElementOnly(g) | ContentType::Mixed(g), Some(own)) => {
                if base.content.is_mixed() != mixed {
                    return Err(schema_error(
                        SchemaErrorKind::InvalidExtension,
                        format!(
                            "mixed and element-only content cannot extend each other ({})",
                            base.display_name()
                        ),
                    ));
                }
                let group = ModelGroup::new(
                    Compositor::Sequence,
                    vec![
                        Particle::new(Term::Model(g.clone()), Occurs::once()),
                        Particle::new(Term::Model(own), Occurs::once()),
                    ],
                );
                Ok(if mixed {
                    ContentType::Mixed(group)
                } else {
                    ContentType::ElementOnly(group)
                })
            }
        }
    }

    fn extend_attributes(
        &self,
        ty: &mut ComplexTypeDef,
        uses: IndexMap<QName, AttributeUse>,
        wildcard: Option<Wildcard>,
    ) -> Result<()> {
        for (name, attribute_use) in uses {
            if attribute_use.is_prohibited() {
                continue;
            }
            if let Some(existing) = ty.attributes.get(&name) {
                let base_type = self.table.attribute(existing.attribute).type_id;
                let own_type = self.table.attribute(attribute_use.attribute).type_id;
                if base_type != own_type {
                    return Err(schema_error(
                        SchemaErrorKind::InvalidExtension,
                        format!(
                            "attribute {} is already declared by the base type with another type",
                            name
                        ),
                    ));
                }
            }
            ty.attributes.insert(name, attribute_use);
        }
        ty.attribute_wildcard = match (ty.attribute_wildcard.take(), wildcard) {
            (Some(base), Some(own)) => Some(Wildcard {
                namespaces: base.namespaces.union(&own.namespaces),
                not_qnames: own
                    .not_qnames
                    .into_iter()
                    .filter(|q| base.not_qnames.contains(q))
                    .collect(),
                process_contents: own.process_contents,
            }),
            (base, own) => own.or(base),
        };
        Ok(())
    }

    fn restrict_attributes(
        &self,
        ty: &mut ComplexTypeDef,
        base: &ComplexTypeDef,
        uses: IndexMap<QName, AttributeUse>,
        wildcard: Option<Wildcard>,
    ) -> Result<()> {
        let restriction_error = |message: String| {
            schema_error(SchemaErrorKind::InvalidRestriction, message)
        };
        let mut merged = base.attributes.clone();
        for (name, own) in uses {
            match base.attributes.get(&name) {
                Some(inherited) => {
                    if inherited.is_required() && !own.is_required() {
                        return Err(restriction_error(format!(
                            "attribute {} is required by the base type",
                            name
                        )));
                    }
                    let base_type = self.table.attribute(inherited.attribute).type_id;
                    let own_type = self.table.attribute(own.attribute).type_id;
                    if !own.is_prohibited() && !self.table.is_derived_from(own_type, base_type) {
                        return Err(restriction_error(format!(
                            "type of attribute {} does not derive from its base declaration",
                            name
                        )));
                    }
                    let fixed = inherited
                        .value_constraint
                        .as_ref()
                        .or(self.table.attribute(inherited.attribute).value_constraint.as_ref())
                        .filter(|v| v.is_fixed());
                    if let Some(fixed) = fixed {
                        let same = own
                            .value_constraint
                            .as_ref()
                            .map_or(false, |v| v.is_fixed() && v.lexical.trim() == fixed.lexical.trim());
                        if !same && !own.is_prohibited() {
                            return Err(restriction_error(format!(
                                "attribute {} must keep the fixed value '{}'",
                                name, fixed.lexical
                            )));
                        }
                    }
                }
                None if own.is_prohibited() => {}
                None => {
                    let allowed = base
                        .attribute_wildcard
                        .as_ref()
                        .map_or(false, |w| w.matches(&name));
                    if !allowed {
                        return Err(restriction_error(format!(
                            "attribute {} is not allowed by the base type",
                            name
                        )));
                    }
                }
            }
            if own.is_prohibited() {
                merged.shift_remove(&name);
            } else {
                merged.insert(name, own);
            }
        }
        if let Some(own) = &wildcard {
            let subset = base
                .attribute_wildcard
                .as_ref()
                .map_or(false, |b| own.is_restriction_of(b));
            if !subset {
                return Err(restriction_error(
                    "attribute wildcard is not a subset of the base wildcard".to_string(),
                ));
            }
        }
        ty.attributes = merged;
        ty.attribute_wildcard = wildcard;
        Ok(())
    }

    // Particles

    /// The top-level particle of a type, wrapped in a one-particle sequence
    fn content_particle(&mut self, node: &Element, src: &SourceInfo) -> Result<Option<ModelGroup>> {
        let child = xsd_children(node).find(|c| {
            matches!(
                c.local_name(),
                tags::GROUP | tags::SEQUENCE | tags::CHOICE | tags::ALL
            )
        });
        match child {
            None => Ok(None),
            Some(child) => {
                let particles = self.particle(child, src)?.into_iter().collect();
                Ok(Some(ModelGroup::new(Compositor::Sequence, particles)))
            }
        }
    }

    fn particle(&mut self, node: &Element, src: &SourceInfo) -> Result<Option<Particle>> {
        let occurs = parse_occurs(
            node.get_attribute(attrs::MIN_OCCURS),
            node.get_attribute(attrs::MAX_OCCURS),
        )?;
        if occurs.max == Some(0) {
            return Ok(None);
        }
        let term = match node.local_name() {
            tags::ELEMENT => Term::Element(self.local_element(node, src)?),
            tags::ANY => Term::Wildcard(self.wildcard(node, src)?),
            tags::GROUP => {
                let name = src.resolve_qname(node, required_attr(node, attrs::REF)?)?;
                Term::Group(self.group_ref(&name)?)
            }
            tags::SEQUENCE | tags::CHOICE | tags::ALL => Term::Model(self.model_group(node, src)?),
            other => {
                return Err(schema_error(
                    SchemaErrorKind::InvalidContentModel,
                    format!("unexpected <{}> in a content model", other),
                ))
            }
        };
        Ok(Some(Particle::new(term, occurs)))
    }

    fn model_group(&mut self, node: &Element, src: &SourceInfo) -> Result<ModelGroup> {
        let compositor = Compositor::from_tag(node.local_name()).ok_or_else(|| {
            invalid(format!("<{}> is not a model group", node.local_name()))
        })?;
        self.nested(|b| {
            let mut particles = Vec::new();
            for child in xsd_children(node) {
                let particle = match b.particle(child, src)? {
                    Some(p) => p,
                    None => continue,
                };
                if compositor == Compositor::All && b.version == XsdVersion::V10 {
                    let single_element = matches!(particle.term, Term::Element(_))
                        && particle.occurs.max.map_or(false, |m| m <= 1);
                    if !single_element {
                        return Err(schema_error(
                            SchemaErrorKind::InvalidContentModel,
                            "an 'all' group may only hold elements occurring at most once",
                        ));
                    }
                }
                particles.push(particle);
            }
            Ok(ModelGroup::new(compositor, particles))
        })
    }

    fn wildcard(&self, node: &Element, src: &SourceInfo) -> Result<Wildcard> {
        let target = src.target_namespace.as_deref();
        let namespaces = match (
            node.get_attribute(attrs::NAMESPACE),
            node.get_attribute(attrs::NOT_NAMESPACE),
        ) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "'namespace' and 'notNamespace' cannot both be present",
                ))
            }
            (Some(value), None) => NamespaceConstraint::from_namespace_attr(value, target)?,
            (None, Some(value)) => {
                self.require_v11("notNamespace")?;
                NamespaceConstraint::from_not_namespace_attr(value, target)?
            }
            (None, None) => NamespaceConstraint::Any,
        };
        let process_contents = match node.get_attribute(attrs::PROCESS_CONTENTS) {
            Some(value) => ProcessContents::from_str(value)?,
            None => ProcessContents::Strict,
        };
        let mut not_qnames = Vec::new();
        if let Some(list) = node.get_attribute(attrs::NOT_QNAME) {
            self.require_v11("notQName")?;
            for token in list.split_whitespace() {
                match token {
                    "##defined" | "##definedSibling" => {
                        debug!(token, "wildcard exclusion keyword ignored")
                    }
                    _ => not_qnames.push(src.resolve_qname(node, token)?),
                }
            }
        }
        Ok(Wildcard {
            namespaces,
            not_qnames,
            process_contents,
        })
    }

    // Declarations

    fn local_element(&mut self, node: &Element, src: &SourceInfo) -> Result<ElementId> {
        if let Some(reference) = node.get_attribute(attrs::REF) {
            let name = src.resolve_qname(node, reference)?;
            return self.element_ref(&name);
        }
        let local = required_attr(node, attrs::NAME)?;
        let form = match node.get_attribute(attrs::FORM) {
            Some(f) => Form::from_str(f)?,
            None => src.element_form,
        };
        let name = match form {
            Form::Qualified => src.qualify(local),
            Form::Unqualified => QName::local(local.trim()),
        };
        let decl = self.element_decl(node, src, name, false)?;
        self.push_element(decl)
    }

    fn element_decl(
        &mut self,
        node: &Element,
        src: &SourceInfo,
        name: QName,
        global: bool,
    ) -> Result<ElementDecl> {
        let explicit = if let Some(t) = node.get_attribute(attrs::TYPE) {
            let type_name = src.resolve_qname(node, t)?;
            Some(self.type_ref(&type_name, Usage::Reference)?)
        } else if let Some(inline) = xsd_child(node, tags::COMPLEX_TYPE) {
            Some(self.anonymous_complex_type(inline, src)?)
        } else if let Some(inline) = xsd_child(node, tags::SIMPLE_TYPE) {
            Some(self.anonymous_simple_type(inline, src)?)
        } else {
            None
        };

        let mut heads = Vec::new();
        if global {
            if let Some(list) = node.get_attribute(attrs::SUBSTITUTION_GROUP) {
                let tokens: Vec<&str> = list.split_whitespace().collect();
                if tokens.len() > 1 {
                    self.require_v11("a substitution group with several heads")?;
                }
                for token in tokens {
                    let head = src.resolve_qname(node, token)?;
                    heads.push(self.element_ref(&head)?);
                }
            }
        }
        let type_id = explicit.unwrap_or_else(|| {
            heads
                .first()
                .map_or(ANY_TYPE, |h| self.table.element(*h).type_id)
        });

        let mut decl = ElementDecl::new(name, type_id);
        decl.global = global;
        decl.nillable = bool_attr(node, attrs::NILLABLE)?.unwrap_or(false);
        decl.value_constraint = ValueConstraint::from_attrs(
            node.get_attribute(attrs::DEFAULT),
            node.get_attribute(attrs::FIXED),
        )?;
        decl.block = derivation_set(node, attrs::BLOCK, src.block_default)?;
        if global {
            decl.is_abstract = bool_attr(node, attrs::ABSTRACT)?.unwrap_or(false);
            decl.final_ = derivation_set(node, attrs::FINAL, src.final_default)?;
            decl.substitution_group = heads;
        }
        for child in xsd_children(node) {
            if IdentityKind::from_tag(child.local_name()).is_some() {
                let id = self.identity(child, src)?;
                decl.identities.push(id);
            }
        }
        Ok(decl)
    }

    fn attribute_decl(
        &mut self,
        node: &Element,
        src: &SourceInfo,
        name: QName,
        global: bool,
    ) -> Result<AttributeDecl> {
        let type_id = if let Some(t) = node.get_attribute(attrs::TYPE) {
            let type_name = src.resolve_qname(node, t)?;
            self.type_ref(&type_name, Usage::Reference)?
        } else if let Some(inline) = xsd_child(node, tags::SIMPLE_TYPE) {
            self.anonymous_simple_type(inline, src)?
        } else {
            ANY_SIMPLE_TYPE
        };
        if !self.table.type_def(type_id).is_simple() {
            return Err(invalid(format!(
                "attribute {} must have a simple type, {} is complex",
                name,
                self.table.type_def(type_id).display_name()
            )));
        }
        let value_constraint = if global {
            ValueConstraint::from_attrs(
                node.get_attribute(attrs::DEFAULT),
                node.get_attribute(attrs::FIXED),
            )?
        } else {
            None
        };
        Ok(AttributeDecl {
            name,
            type_id,
            value_constraint,
            global,
        })
    }

    fn attribute_use(&mut self, node: &Element, src: &SourceInfo) -> Result<(QName, AttributeUse)> {
        let use_ = match node.get_attribute(attrs::USE) {
            Some(value) => Use::from_str(value)?,
            None => Use::Optional,
        };
        let value_constraint = ValueConstraint::from_attrs(
            node.get_attribute(attrs::DEFAULT),
            node.get_attribute(attrs::FIXED),
        )?;
        if use_ != Use::Optional && value_constraint.as_ref().map_or(false, |v| !v.is_fixed()) {
            return Err(invalid("an attribute with a default value must be optional"));
        }

        let (name, attribute) = if let Some(reference) = node.get_attribute(attrs::REF) {
            let name = src.resolve_qname(node, reference)?;
            let id = self.attribute_ref(&name)?;
            (name, id)
        } else {
            let local = required_attr(node, attrs::NAME)?;
            let form = match node.get_attribute(attrs::FORM) {
                Some(f) => Form::from_str(f)?,
                None => src.attribute_form,
            };
            let name = match form {
                Form::Qualified => src.qualify(local),
                Form::Unqualified => QName::local(local.trim()),
            };
            let decl = self.attribute_decl(node, src, name.clone(), false)?;
            (name, self.push_attribute(decl)?)
        };
        Ok((
            name,
            AttributeUse {
                attribute,
                use_,
                value_constraint,
            },
        ))
    }

    /// Attribute uses and the complete wildcard of a type or attribute group
    fn attribute_uses(
        &mut self,
        node: &Element,
        src: &SourceInfo,
    ) -> Result<(IndexMap<QName, AttributeUse>, Option<Wildcard>)> {
        let mut uses: IndexMap<QName, AttributeUse> = IndexMap::new();
        let mut local_wildcard = None;
        let mut group_wildcards = Vec::new();

        for child in xsd_children(node) {
            match child.local_name() {
                tags::ATTRIBUTE => {
                    let (name, attribute_use) = self.attribute_use(child, src)?;
                    if uses.contains_key(&name) {
                        return Err(invalid(format!("attribute {} is declared twice", name)));
                    }
                    uses.insert(name, attribute_use);
                }
                tags::ATTRIBUTE_GROUP => {
                    let name = src.resolve_qname(child, required_attr(child, attrs::REF)?)?;
                    let id = self.attribute_group_ref(&name)?;
                    let group = self.table.attribute_group(id).clone();
                    for (attribute, attribute_use) in group.uses {
                        match uses.get(&attribute) {
                            Some(existing) if existing.attribute != attribute_use.attribute => {
                                return Err(invalid(format!(
                                    "attribute {} is declared twice",
                                    attribute
                                )))
                            }
                            Some(_) => {}
                            None => {
                                uses.insert(attribute, attribute_use);
                            }
                        }
                    }
                    group_wildcards.extend(group.wildcard);
                }
                tags::ANY_ATTRIBUTE => local_wildcard = Some(self.wildcard(child, src)?),
                _ => {}
            }
        }

        let mut wildcards = local_wildcard.into_iter().chain(group_wildcards);
        let wildcard = wildcards.next().map(|first| {
            wildcards.fold(first, |acc, w| Wildcard {
                namespaces: acc.namespaces.intersection(&w.namespaces),
                not_qnames: acc
                    .not_qnames
                    .iter()
                    .chain(w.not_qnames.iter().filter(|q| !acc.not_qnames.contains(q)))
                    .cloned()
                    .collect(),
                process_contents: acc.process_contents,
            })
        });
        Ok((uses, wildcard))
    }

    fn xpath_namespace(&self, node: &Element, src: &SourceInfo) -> Option<String> {
        if self.version == XsdVersion::V10 {
            return None;
        }
        match node.get_attribute(attrs::XPATH_DEFAULT_NAMESPACE) {
            Some("##targetNamespace") => src.target_namespace.clone(),
            Some("##defaultNamespace") => {
                node.namespaces.get_default_namespace().map(str::to_string)
            }
            Some("##local") => None,
            Some(uri) => Some(uri.trim().to_string()),
            None => src.xpath_default_namespace.clone(),
        }
    }

    fn identity(&mut self, node: &Element, src: &SourceInfo) -> Result<IdentityId> {
        let kind = IdentityKind::from_tag(node.local_name())
            .ok_or_else(|| invalid(format!("<{}> is not an identity constraint", node.local_name())))?;
        let name = src.qualify(required_attr(node, attrs::NAME)?);

        let selector_node = xsd_child(node, tags::SELECTOR)
            .ok_or_else(|| invalid(format!("{} {} needs a selector", kind, name)))?;
        let selector = XPathSelector::selector(
            required_attr(selector_node, attrs::XPATH)?,
            &selector_node.namespaces,
            self.xpath_namespace(selector_node, src).as_deref(),
        )?;
        let mut fields = Vec::new();
        for field in node.children.iter().filter(|c| is_xsd(c, tags::FIELD)) {
            fields.push(XPathSelector::field(
                required_attr(field, attrs::XPATH)?,
                &field.namespaces,
                self.xpath_namespace(field, src).as_deref(),
            )?);
        }
        if fields.is_empty() {
            return Err(invalid(format!("{} {} needs at least one field", kind, name)));
        }
        let refer_name = match kind {
            IdentityKind::Keyref => {
                Some(src.resolve_qname(node, required_attr(node, attrs::REFER)?)?)
            }
            _ => None,
        };

        if self.identity_names.contains_key(&name) {
            return Err(schema_error(
                SchemaErrorKind::DuplicateComponent,
                format!("identity constraint {} is declared twice", name),
            ));
        }
        self.reserve_room()?;
        let id = IdentityId::new(self.table.identities.len());
        self.table.identities.push(IdentityConstraint {
            name: name.clone(),
            kind,
            selector,
            fields,
            refer_name,
            refer: None,
        });
        self.identity_names.insert(name.clone(), id);
        self.table.globals.insert(
            ComponentKey::new(ComponentCategory::IdentityConstraint, name),
            ComponentRef::Identity(id),
        );
        Ok(id)
    }

    // Finishing passes

    fn check_group_cycles(&mut self) -> Result<()> {
        for index in 0..self.table.groups.len() {
            let id = GroupId::new(index);
            if self.group_reaches(&self.table.groups[index].model, id, &mut Vec::new()) {
                let name = self.table.groups[index].name.clone();
                self.report(
                    SchemaError::new(
                        SchemaErrorKind::UnresolvableDerivation,
                        format!("group {} contains itself", name),
                    )
                    .with_component(name.to_string()),
                )?;
                self.table.groups[index].model = lax_any_group();
            }
        }
        Ok(())
    }

    /// Whether `group` reaches `target` without passing through an element
    fn group_reaches(&self, group: &ModelGroup, target: GroupId, seen: &mut Vec<GroupId>) -> bool {
        group.particles.iter().any(|p| match &p.term {
            Term::Group(id) if *id == target => true,
            Term::Group(id) => {
                if seen.contains(id) {
                    return false;
                }
                seen.push(*id);
                self.group_reaches(&self.table.group(*id).model, target, seen)
            }
            Term::Model(g) => self.group_reaches(g, target, seen),
            _ => false,
        })
    }

    fn link_substitution_groups(&mut self) -> Result<()> {
        let mut direct: BTreeMap<ElementId, Vec<ElementId>> = BTreeMap::new();
        for (index, decl) in self.table.elements.iter().enumerate() {
            for head in &decl.substitution_group {
                direct.entry(*head).or_default().push(ElementId::new(index));
            }
        }

        let mut problems = Vec::new();
        let mut substitutions = BTreeMap::new();
        for (head, members) in &direct {
            let head_decl = self.table.element(*head);
            let mut stack = members.clone();
            let mut seen = BTreeSet::new();
            let mut admitted = Vec::new();
            while let Some(member) = stack.pop() {
                if member == *head {
                    problems.push(
                        SchemaError::new(
                            SchemaErrorKind::UnresolvableDerivation,
                            format!("substitution group of {} is circular", head_decl.name),
                        )
                        .with_component(head_decl.name.to_string()),
                    );
                    continue;
                }
                if !seen.insert(member) {
                    continue;
                }
                if let Some(next) = direct.get(&member) {
                    stack.extend(next.iter().copied());
                }

                let member_decl = self.table.element(member);
                let path = match self
                    .table
                    .derivation_path(member_decl.type_id, head_decl.type_id)
                {
                    Some(path) => path,
                    None => {
                        problems.push(
                            SchemaError::new(
                                SchemaErrorKind::InvalidComponent,
                                format!(
                                    "type of {} does not derive from the type of its substitution group head {}",
                                    member_decl.name, head_decl.name
                                ),
                            )
                            .with_component(member_decl.name.to_string()),
                        );
                        continue;
                    }
                };
                if path.iter().any(|m| head_decl.final_.contains(*m)) {
                    problems.push(
                        SchemaError::new(
                            SchemaErrorKind::InvalidComponent,
                            format!(
                                "{} cannot join the substitution group of {}, which is final",
                                member_decl.name, head_decl.name
                            ),
                        )
                        .with_component(member_decl.name.to_string()),
                    );
                    continue;
                }
                if head_decl.block.substitution || path.iter().any(|m| head_decl.block.contains(*m)) {
                    continue;
                }
                admitted.push(member);
            }
            admitted.sort();
            substitutions.insert(*head, admitted);
        }
        self.table.substitutions = substitutions;
        for problem in problems {
            self.report(problem)?;
        }
        Ok(())
    }

    fn link_identities(&mut self) -> Result<()> {
        let mut problems = Vec::new();
        let mut links = Vec::new();
        for (index, identity) in self.table.identities.iter().enumerate() {
            let refer_name = match &identity.refer_name {
                Some(name) => name,
                None => continue,
            };
            match self.identity_names.get(refer_name) {
                Some(target) => {
                    let referenced = self.table.identity(*target);
                    if referenced.kind == IdentityKind::Keyref {
                        problems.push(SchemaError::new(
                            SchemaErrorKind::InvalidComponent,
                            format!("keyref {} refers to keyref {}", identity.name, refer_name),
                        ));
                    } else if referenced.fields.len() != identity.fields.len() {
                        problems.push(SchemaError::new(
                            SchemaErrorKind::InvalidComponent,
                            format!(
                                "keyref {} has {} fields but {} has {}",
                                identity.name,
                                identity.fields.len(),
                                refer_name,
                                referenced.fields.len()
                            ),
                        ));
                    } else {
                        links.push((index, *target));
                    }
                }
                None => problems.push(SchemaError::new(
                    SchemaErrorKind::UnresolvedReference,
                    format!(
                        "key {} referenced by keyref {} not found",
                        refer_name, identity.name
                    ),
                )),
            }
        }
        for (index, target) in links {
            self.table.identities[index].refer = Some(target);
        }
        for problem in problems {
            self.report(problem)?;
        }
        Ok(())
    }

    fn constraint_sites(&self) -> Vec<(ConstraintSite, TypeId)> {
        let mut sites = Vec::new();
        for (i, decl) in self.table.elements.iter().enumerate() {
            if decl.value_constraint.is_some() {
                sites.push((ConstraintSite::Element(i), decl.type_id));
            }
        }
        for (i, decl) in self.table.attributes.iter().enumerate() {
            if decl.value_constraint.is_some() {
                sites.push((ConstraintSite::Attribute(i), decl.type_id));
            }
        }
        for (t, def) in self.table.types.iter().enumerate() {
            if let TypeDef::Complex(ct) = def {
                for (u, attribute_use) in ct.attributes.values().enumerate() {
                    if attribute_use.value_constraint.is_some() {
                        let type_id = self.table.attribute(attribute_use.attribute).type_id;
                        sites.push((ConstraintSite::TypeUse(t, u), type_id));
                    }
                }
            }
        }
        for (g, group) in self.table.attribute_groups.iter().enumerate() {
            for (u, attribute_use) in group.uses.values().enumerate() {
                if attribute_use.value_constraint.is_some() {
                    let type_id = self.table.attribute(attribute_use.attribute).type_id;
                    sites.push((ConstraintSite::GroupUse(g, u), type_id));
                }
            }
        }
        sites
    }

    fn site_name(&self, site: ConstraintSite) -> String {
        match site {
            ConstraintSite::Element(i) => format!("element {}", self.table.elements[i].name),
            ConstraintSite::Attribute(i) => format!("attribute {}", self.table.attributes[i].name),
            ConstraintSite::TypeUse(t, u) => match &self.table.types[t] {
                TypeDef::Complex(ct) => ct.attributes.get_index(u).map_or_else(
                    || ct.display_name(),
                    |(name, _)| format!("attribute {} of {}", name, ct.display_name()),
                ),
                TypeDef::Simple(st) => st.display_name(),
            },
            ConstraintSite::GroupUse(g, u) => self.table.attribute_groups[g]
                .uses
                .get_index(u)
                .map_or_else(String::new, |(name, _)| format!("attribute {}", name)),
        }
    }

    fn constraint(&self, site: ConstraintSite) -> Option<&ValueConstraint> {
        match site {
            ConstraintSite::Element(i) => self.table.elements.get(i)?.value_constraint.as_ref(),
            ConstraintSite::Attribute(i) => {
                self.table.attributes.get(i)?.value_constraint.as_ref()
            }
            ConstraintSite::TypeUse(t, u) => match self.table.types.get(t)? {
                TypeDef::Complex(ct) => ct.attributes.get_index(u)?.1.value_constraint.as_ref(),
                TypeDef::Simple(_) => None,
            },
            ConstraintSite::GroupUse(g, u) => self
                .table
                .attribute_groups
                .get(g)?
                .uses
                .get_index(u)?
                .1
                .value_constraint
                .as_ref(),
        }
    }

    fn constraint_mut(&mut self, site: ConstraintSite) -> Option<&mut Option<ValueConstraint>> {
        match site {
            ConstraintSite::Element(i) => {
                self.table.elements.get_mut(i).map(|d| &mut d.value_constraint)
            }
            ConstraintSite::Attribute(i) => {
                self.table.attributes.get_mut(i).map(|d| &mut d.value_constraint)
            }
            ConstraintSite::TypeUse(t, u) => match self.table.types.get_mut(t)? {
                TypeDef::Complex(ct) => ct
                    .attributes
                    .get_index_mut(u)
                    .map(|(_, x)| &mut x.value_constraint),
                TypeDef::Simple(_) => None,
            },
            ConstraintSite::GroupUse(g, u) => self
                .table
                .attribute_groups
                .get_mut(g)?
                .uses
                .get_index_mut(u)
                .map(|(_, x)| &mut x.value_constraint),
        }
    }

    /// Typed value of a default or fixed value; `None` when it stays lexical
    fn constraint_value(
        &self,
        type_id: TypeId,
        constraint: &ValueConstraint,
    ) -> std::result::Result<Option<SimpleValue>, String> {
        let simple = match self.table.type_def(type_id) {
            TypeDef::Simple(_) => type_id,
            TypeDef::Complex(ct) => match &ct.content {
                ContentType::Simple(st) => *st,
                ContentType::Mixed(g) if g.is_emptiable(&self.table) => return Ok(None),
                other => {
                    return Err(format!(
                        "a default or fixed value needs simple or mixed content, {} has {} content",
                        ct.display_name(),
                        other.kind_name()
                    ))
                }
            },
        };
        let def = self
            .table
            .simple_type(simple)
            .ok_or_else(|| format!("type {} is not simple", self.table.type_def(simple).display_name()))?;
        if def.needs_namespaces(&self.table) {
            return Ok(None);
        }
        def.validate(&self.table, &constraint.lexical, None)
            .map(Some)
            .map_err(|e| format!("'{}' is not a valid value: {}", constraint.lexical, e.message))
    }

    fn check_value_constraints(&mut self) -> Result<()> {
        for (site, type_id) in self.constraint_sites() {
            let constraint = match self.constraint(site) {
                Some(c) => c.clone(),
                None => continue,
            };
            match self.constraint_value(type_id, &constraint) {
                Ok(value) => {
                    if let Some(Some(c)) = self.constraint_mut(site) {
                        c.value = value;
                    }
                }
                Err(reason) => {
                    let name = self.site_name(site);
                    self.report(
                        SchemaError::new(
                            SchemaErrorKind::InvalidComponent,
                            format!("{}: {}", name, reason),
                        )
                        .with_component(name),
                    )?;
                    if let Some(slot) = self.constraint_mut(site) {
                        *slot = None;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_restrictions(&mut self) -> Result<()> {
        let mut problems = Vec::new();
        for (index, def) in self.table.types.iter().enumerate() {
            let ct = match def {
                TypeDef::Complex(ct) if index != ANY_TYPE.index() => ct,
                _ => continue,
            };
            if ct.derivation != DerivationMethod::Restriction || ct.base == ANY_TYPE {
                continue;
            }
            let base = match self.table.type_def(ct.base).as_complex() {
                Some(base) => base,
                None => continue,
            };
            if let Err(reason) = self.content_restricts(&ct.content, &base.content) {
                problems.push(
                    SchemaError::new(
                        SchemaErrorKind::InvalidRestriction,
                        format!(
                            "{} is not a valid restriction of {}: {}",
                            ct.display_name(),
                            base.display_name(),
                            reason
                        ),
                    )
                    .with_component(ct.display_name()),
                );
            }
        }
        for problem in problems {
            self.report(problem)?;
        }
        Ok(())
    }

    fn content_restricts(
        &self,
        derived: &ContentType,
        base: &ContentType,
    ) -> std::result::Result<(), String> {
        let whole = |g: &ModelGroup| Particle::new(Term::Model(g.clone()), Occurs::once());
        match (derived, base) {
            (ContentType::Empty, ContentType::Empty) => Ok(()),
            (ContentType::Empty, ContentType::ElementOnly(g) | ContentType::Mixed(g))
            | (ContentType::Simple(_), ContentType::Mixed(g)) => {
                if g.is_emptiable(&self.table) {
                    Ok(())
                } else {
                    Err("the base content model is not emptiable".to_string())
                }
            }
            (ContentType::Simple(d), ContentType::Simple(b)) => {
                if self.table.is_derived_from(*d, *b) {
                    Ok(())
                } else {
                    Err("the content type does not derive from the base content type".to_string())
                }
            }
            (ContentType::ElementOnly(d), ContentType::ElementOnly(b) | ContentType::Mixed(b))
            | (ContentType::Mixed(d), ContentType::Mixed(b)) => {
                self.particle_restricts(&whole(d), &whole(b))
            }
            (derived, base) => Err(format!(
                "{} content cannot restrict {} content",
                derived.kind_name(),
                base.kind_name()
            )),
        }
    }

    /// Collapse group references and single-particle groups
    fn pointless(&self, particle: &Particle) -> Particle {
        let mut current = particle.clone();
        loop {
            if let Term::Group(id) = &current.term {
                current.term = Term::Model(self.table.group(*id).model.clone());
            }
            let inner = match &current.term {
                Term::Model(g) if g.particles.len() == 1 => g.particles[0].clone(),
                _ => return current,
            };
            if current.occurs != Occurs::once() && inner.occurs != Occurs::once() {
                return current;
            }
            current = Particle::new(inner.term, current.occurs.multiply(inner.occurs));
        }
    }

    fn particle_emptiable(&self, particle: &Particle) -> bool {
        particle.occurs.min == 0
            || match &particle.term {
                Term::Model(g) => g.is_emptiable(&self.table),
                Term::Group(id) => self.table.group(*id).model.is_emptiable(&self.table),
                _ => false,
            }
    }

    fn particle_restricts(&self, derived: &Particle, base: &Particle) -> std::result::Result<(), String> {
        let derived = self.pointless(derived);
        let base = self.pointless(base);
        if !derived.occurs.has_occurs_restriction(&base.occurs) {
            return Err(format!(
                "occurrence range {} is not within {}",
                derived.occurs, base.occurs
            ));
        }
        match (&derived.term, &base.term) {
            (Term::Element(d), Term::Element(b)) => self.element_restricts(*d, *b),
            (Term::Element(d), Term::Wildcard(w)) => {
                let name = &self.table.element(*d).name;
                if w.matches(name) {
                    Ok(())
                } else {
                    Err(format!("element {} is not allowed by the base wildcard", name))
                }
            }
            (Term::Wildcard(d), Term::Wildcard(b)) => {
                if d.is_restriction_of(b) {
                    Ok(())
                } else {
                    Err("wildcard is not a subset of the base wildcard".to_string())
                }
            }
            (Term::Model(d), Term::Wildcard(w)) => self.group_within_wildcard(d, w),
            (Term::Model(d), Term::Model(b)) => self.group_restricts(d, b),
            (Term::Element(_) | Term::Wildcard(_), Term::Model(b)) => {
                let single = ModelGroup::new(
                    b.compositor,
                    vec![Particle::new(derived.term.clone(), Occurs::once())],
                );
                self.group_restricts(&single, b)
            }
            _ => Err("particle does not match the base particle".to_string()),
        }
    }

    fn element_restricts(&self, derived: ElementId, base: ElementId) -> std::result::Result<(), String> {
        if derived == base {
            return Ok(());
        }
        let d = self.table.element(derived);
        let b = self.table.element(base);
        if d.name != b.name && !self.table.substitution_members(base).contains(&derived) {
            return Err(format!("element {} does not match {}", d.name, b.name));
        }
        if d.nillable && !b.nillable {
            return Err(format!("element {} cannot become nillable", d.name));
        }
        if let Some(fixed) = b.value_constraint.as_ref().filter(|v| v.is_fixed()) {
            let same = d
                .value_constraint
                .as_ref()
                .map_or(false, |v| v.is_fixed() && v.lexical.trim() == fixed.lexical.trim());
            if !same {
                return Err(format!("element {} must keep its fixed value", d.name));
            }
        }
        if !self.table.is_derived_from(d.type_id, b.type_id) {
            return Err(format!(
                "type of element {} does not derive from the base declaration's type",
                d.name
            ));
        }
        Ok(())
    }

    fn group_within_wildcard(&self, group: &ModelGroup, wildcard: &Wildcard) -> std::result::Result<(), String> {
        for particle in &group.particles {
            match &particle.term {
                Term::Element(id) => {
                    let name = &self.table.element(*id).name;
                    if !wildcard.matches(name) {
                        return Err(format!("element {} is not allowed by the base wildcard", name));
                    }
                }
                Term::Wildcard(w) => {
                    if !w.is_restriction_of(wildcard) {
                        return Err("wildcard is not a subset of the base wildcard".to_string());
                    }
                }
                Term::Model(g) => self.group_within_wildcard(g, wildcard)?,
                Term::Group(id) => self.group_within_wildcard(&self.table.group(*id).model, wildcard)?,
            }
        }
        Ok(())
    }

    fn group_restricts(&self, derived: &ModelGroup, base: &ModelGroup) -> std::result::Result<(), String> {
        use Compositor::{All, Choice, Sequence};
        match (derived.compositor, base.compositor) {
            (Sequence, Sequence) => {
                let mut next = 0;
                for particle in &derived.particles {
                    loop {
                        let candidate = base.particles.get(next).ok_or_else(|| {
                            "derived particles do not map onto the base sequence".to_string()
                        })?;
                        next += 1;
                        if self.particle_restricts(particle, candidate).is_ok() {
                            break;
                        }
                        if !self.particle_emptiable(candidate) {
                            return Err("a required base particle is missing".to_string());
                        }
                    }
                }
                if base.particles[next..].iter().all(|p| self.particle_emptiable(p)) {
                    Ok(())
                } else {
                    Err("a required base particle is missing".to_string())
                }
            }
            (Choice, Choice) => {
                let mut next = 0;
                for particle in &derived.particles {
                    let found = base.particles[next..]
                        .iter()
                        .position(|b| self.particle_restricts(particle, b).is_ok())
                        .ok_or_else(|| "a choice branch has no base counterpart".to_string())?;
                    next += found + 1;
                }
                Ok(())
            }
            (All | Sequence, All) => {
                let mut used = vec![false; base.particles.len()];
                for particle in &derived.particles {
                    let found = base.particles.iter().enumerate().position(|(i, b)| {
                        !used[i] && self.particle_restricts(particle, b).is_ok()
                    });
                    match found {
                        Some(i) => used[i] = true,
                        None => return Err("a particle has no base counterpart".to_string()),
                    }
                }
                let missing = base
                    .particles
                    .iter()
                    .zip(&used)
                    .any(|(p, used)| !used && !self.particle_emptiable(p));
                if missing {
                    Err("a required base particle is missing".to_string())
                } else {
                    Ok(())
                }
            }
            (Sequence | All, Choice) => {
                for particle in &derived.particles {
                    if !base
                        .particles
                        .iter()
                        .any(|b| self.particle_restricts(particle, b).is_ok())
                    {
                        return Err("a particle has no base counterpart".to_string());
                    }
                }
                Ok(())
            }
            (d, b) => Err(format!("{} group cannot restrict {} group", d, b)),
        }
    }

    fn compile_models(&mut self) -> Result<()> {
        for index in 0..self.table.types.len() {
            let compiled = match &self.table.types[index] {
                TypeDef::Complex(ct) => match ct.content.model_group() {
                    Some(group) => ContentModel::compile(group, &self.table, self.limits),
                    None => continue,
                },
                TypeDef::Simple(_) => continue,
            };
            match compiled {
                Ok(model) => {
                    if let TypeDef::Complex(ct) = &mut self.table.types[index] {
                        ct.model = Some(model);
                    }
                }
                Err(Error::Schema(error)) => {
                    let name = self.table.types[index].display_name();
                    let error = if error.component.is_none() {
                        error.with_component(name)
                    } else {
                        error
                    };
                    self.report(error)?;
                    let any = ComplexTypeDef::any_type(ANY_TYPE);
                    let model = match any.content.model_group() {
                        Some(group) => Some(ContentModel::compile(group, &self.table, self.limits)?),
                        None => None,
                    };
                    if let TypeDef::Complex(ct) = &mut self.table.types[index] {
                        ct.content = any.content;
                        ct.model = model;
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }
}
