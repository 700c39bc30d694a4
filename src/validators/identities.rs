//! XSD identity constraints
//!
//! This module implements identity constraints for XML Schema:
//! - xs:unique - selected tuples must be distinct, incomplete tuples are skipped
//! - xs:key - like unique, but every field must be present
//! - xs:keyref - every complete tuple must appear in the referenced key or unique
//!
//! Checking happens when the element declaring the constraint is left, so
//! all of its descendants have been validated and their typed values are
//! known. Key tables propagate to the enclosing scope, and keyrefs whose
//! referenced table is not yet closed wait in the enclosing scope, so
//! forward references are legal.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::documents::Element;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::namespaces::QName;
use crate::xpath::{SelectorEvaluator, XPathNode, XPathSelector};

use super::base::IdentityId;
use super::elements::ElementDecl;
use super::globals::ComponentTable;
use super::values::SimpleValue;

/// Kind of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// xs:unique
    Unique,
    /// xs:key
    Key,
    /// xs:keyref
    Keyref,
}

impl IdentityKind {
    /// Kind from the declaring tag's local name
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "unique" => Some(IdentityKind::Unique),
            "key" => Some(IdentityKind::Key),
            "keyref" => Some(IdentityKind::Keyref),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKind::Unique => write!(f, "unique"),
            IdentityKind::Key => write!(f, "key"),
            IdentityKind::Keyref => write!(f, "keyref"),
        }
    }
}

/// A unique, key or keyref definition
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConstraint {
    /// Constraint name
    pub name: QName,
    /// Kind of constraint
    pub kind: IdentityKind,
    /// Selector path
    pub selector: XPathSelector,
    /// Field paths, one per tuple member
    pub fields: Vec<XPathSelector>,
    /// Referenced key name, for keyrefs
    pub refer_name: Option<QName>,
    /// Referenced key or unique, resolved at compile time
    pub refer: Option<IdentityId>,
}

/// Typed values of validated nodes, keyed by document position
#[derive(Debug, Default)]
pub(crate) struct NodeValues {
    keys: HashMap<(usize, Option<QName>), String>,
}

impl NodeValues {
    pub(crate) fn record_element(&mut self, element: &Element, value: &SimpleValue) {
        self.keys
            .insert((element.index, None), value.identity_key());
    }

    pub(crate) fn record_attribute(&mut self, element: &Element, name: &QName, value: &SimpleValue) {
        self.keys
            .insert((element.index, Some(name.clone())), value.identity_key());
    }

    /// Identity key of a field node; untyped nodes compare as strings
    fn key_of(&self, node: &XPathNode<'_>) -> String {
        let slot = match node {
            XPathNode::Element(e) => (e.index, None),
            XPathNode::Attribute { owner, name, .. } => (owner.index, Some((*name).clone())),
        };
        match self.keys.get(&slot) {
            Some(key) => key.clone(),
            None => format!("S|{}", node.string_value().trim()),
        }
    }
}

type Tuple = Vec<String>;

#[derive(Debug, Default)]
struct KeyTable {
    /// Tuple to its lexical form, for messages
    entries: HashMap<Tuple, String>,
}

#[derive(Debug)]
struct PendingRef {
    keyref: IdentityId,
    tuples: Vec<(Tuple, String)>,
    path: String,
}

#[derive(Debug)]
struct Scope {
    element: usize,
    tables: BTreeMap<IdentityId, KeyTable>,
    pending: Vec<PendingRef>,
}

/// Identity scopes of one document validation
#[derive(Debug)]
pub(crate) struct IdentityEngine<'s> {
    table: &'s ComponentTable,
    evaluator: &'s dyn SelectorEvaluator,
    scopes: Vec<Scope>,
    pub(crate) values: NodeValues,
}

fn violation(message: String, path: &str) -> ValidationError {
    ValidationError::new(ValidationErrorKind::IdentityConstraintViolation, message).with_path(path)
}

impl<'s> IdentityEngine<'s> {
    pub(crate) fn new(table: &'s ComponentTable, evaluator: &'s dyn SelectorEvaluator) -> Self {
        Self {
            table,
            evaluator,
            scopes: Vec::new(),
            values: NodeValues::default(),
        }
    }

    /// Open the scopes of an element's constraints
    pub(crate) fn enter(&mut self, element: &Element, decl: &ElementDecl) {
        if decl.identities.is_empty() {
            return;
        }
        self.scopes.push(Scope {
            element: element.index,
            tables: BTreeMap::new(),
            pending: Vec::new(),
        });
    }

    /// Close the scopes of an element's constraints and check them
    pub(crate) fn leave(
        &mut self,
        element: &Element,
        decl: &ElementDecl,
        path: &str,
    ) -> Vec<ValidationError> {
        if decl.identities.is_empty() {
            return Vec::new();
        }
        let mut scope = match self.scopes.pop() {
            Some(scope) if scope.element == element.index => scope,
            Some(other) => {
                self.scopes.push(other);
                return Vec::new();
            }
            None => return Vec::new(),
        };

        let mut errors = Vec::new();
        let (refs, keys): (Vec<IdentityId>, Vec<IdentityId>) = decl
            .identities
            .iter()
            .partition(|id| self.table.identity(**id).kind == IdentityKind::Keyref);

        for id in keys {
            let mut table = KeyTable::default();
            for (tuple, display) in self.collect(id, element, path, &mut errors) {
                if table.entries.insert(tuple, display.clone()).is_some() {
                    let constraint = self.table.identity(id);
                    errors.push(violation(
                        format!(
                            "duplicate value ({}) for {} '{}'",
                            display, constraint.kind, constraint.name
                        ),
                        path,
                    ));
                }
            }
            scope.tables.insert(id, table);
        }

        for id in refs {
            let tuples = self.collect(id, element, path, &mut errors);
            scope.pending.push(PendingRef {
                keyref: id,
                tuples,
                path: path.to_string(),
            });
        }

        let pending = std::mem::take(&mut scope.pending);
        let mut deferred = Vec::new();
        for item in pending {
            let constraint = self.table.identity(item.keyref);
            match constraint.refer.and_then(|r| scope.tables.get(&r)) {
                Some(table) => {
                    for (tuple, display) in &item.tuples {
                        if !table.entries.contains_key(tuple) {
                            errors.push(violation(
                                format!(
                                    "keyref '{}' value ({}) does not match any '{}' value",
                                    constraint.name,
                                    display,
                                    constraint
                                        .refer_name
                                        .as_ref()
                                        .map(|n| n.to_string())
                                        .unwrap_or_default()
                                ),
                                &item.path,
                            ));
                        }
                    }
                }
                None => deferred.push(item),
            }
        }

        match self.scopes.last_mut() {
            Some(parent) => {
                for (id, table) in scope.tables {
                    let target = parent.tables.entry(id).or_default();
                    for (tuple, display) in table.entries {
                        target.entries.entry(tuple).or_insert(display);
                    }
                }
                parent.pending.extend(deferred);
            }
            None => {
                for item in deferred {
                    let constraint = self.table.identity(item.keyref);
                    if item.tuples.is_empty() {
                        continue;
                    }
                    errors.push(violation(
                        format!(
                            "keyref '{}' is unresolved: no referenced key values in scope",
                            constraint.name
                        ),
                        &item.path,
                    ));
                }
            }
        }
        errors
    }

    /// Complete field tuples selected by a constraint
    fn collect(
        &self,
        id: IdentityId,
        element: &Element,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) -> Vec<(Tuple, String)> {
        let constraint = self.table.identity(id);
        let mut tuples = Vec::new();
        for node in self.evaluator.evaluate(&constraint.selector, element) {
            let target = match node.as_element() {
                Some(target) => target,
                None => continue,
            };
            let mut tuple = Vec::with_capacity(constraint.fields.len());
            let mut display = Vec::with_capacity(constraint.fields.len());
            let mut complete = true;
            for field in &constraint.fields {
                let selected = self.evaluator.evaluate(field, target);
                match selected.as_slice() {
                    [] => complete = false,
                    [one] => {
                        tuple.push(self.values.key_of(one));
                        display.push(one.string_value().trim().to_string());
                    }
                    _ => {
                        errors.push(violation(
                            format!(
                                "field '{}' of {} '{}' selects more than one node",
                                field, constraint.kind, constraint.name
                            ),
                            path,
                        ));
                        complete = false;
                    }
                }
            }
            if !complete {
                if constraint.kind == IdentityKind::Key {
                    errors.push(violation(
                        format!(
                            "missing field value for key '{}' on element {}",
                            constraint.name, target.qname
                        ),
                        path,
                    ));
                }
                continue;
            }
            tuples.push((tuple, display.join(", ")));
        }
        tuples
    }
}
