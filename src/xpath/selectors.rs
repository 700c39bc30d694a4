//! Compiled identity-constraint paths and the default evaluator

use std::fmt;

use crate::documents::Element;
use crate::error::{Result, SchemaError, SchemaErrorKind};
use crate::names::{is_valid_ncname, split_qname};
use crate::namespaces::{NamespaceContext, QName};

use super::{SelectorEvaluator, XPathNode};

/// Name test of a path step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `p:*`
    Namespace(Option<String>),
    /// A specific name
    Name(QName),
}

impl NameTest {
    /// Whether the test accepts a name
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(ns) => name.namespace == *ns,
            NameTest::Name(q) => q == name,
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameTest::Any => f.write_str("*"),
            NameTest::Namespace(Some(ns)) => write!(f, "{{{}}}*", ns),
            NameTest::Namespace(None) => f.write_str("{}*"),
            NameTest::Name(q) => write!(f, "{}", q),
        }
    }
}

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.`
    SelfNode,
    /// Child element step
    Child(NameTest),
    /// Attribute step (last step of a field only)
    Attribute(NameTest),
}

/// One branch of a union
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    /// Path starts with `.//`
    pub descendant: bool,
    /// Steps after the leading `.` or `.//`
    pub steps: Vec<Step>,
}

/// A compiled selector or field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathSelector {
    /// Path as written in the schema
    pub source: String,
    /// Union branches
    pub branches: Vec<PathExpr>,
}

fn path_error(source: &str, reason: impl fmt::Display) -> crate::error::Error {
    SchemaError::new(
        SchemaErrorKind::InvalidComponent,
        format!("invalid XPath expression '{}': {}", source, reason),
    )
    .into()
}

/// Split one union branch into its leading marker and steps
///
/// Returns whether the branch starts with `.//` and the remaining step
/// strings. Empty steps (`a//b`, trailing `/`) are kept so the caller can
/// reject them.
pub fn split_path(path: &str) -> (bool, Vec<&str>) {
    let path = path.trim();
    if let Some(rest) = path.strip_prefix(".//") {
        return (true, rest.split('/').map(str::trim).collect());
    }
    if path.is_empty() {
        return (false, Vec::new());
    }
    (false, path.split('/').map(str::trim).collect())
}

impl XPathSelector {
    /// Compile an `xs:selector` path
    pub fn selector(
        source: &str,
        namespaces: &NamespaceContext,
        default_namespace: Option<&str>,
    ) -> Result<Self> {
        Self::compile(source, namespaces, default_namespace, false)
    }

    /// Compile an `xs:field` path; the last step may select an attribute
    pub fn field(
        source: &str,
        namespaces: &NamespaceContext,
        default_namespace: Option<&str>,
    ) -> Result<Self> {
        Self::compile(source, namespaces, default_namespace, true)
    }

    fn compile(
        source: &str,
        namespaces: &NamespaceContext,
        default_namespace: Option<&str>,
        allow_attribute: bool,
    ) -> Result<Self> {
        let mut branches = Vec::new();
        for branch in source.split('|') {
            let (descendant, parts) = split_path(branch);
            if parts.is_empty() {
                return Err(path_error(source, "empty path"));
            }
            let mut steps = Vec::new();
            let last = parts.len() - 1;
            for (i, part) in parts.iter().enumerate() {
                let step = parse_step(source, part, namespaces, default_namespace)?;
                if let Step::Attribute(_) = step {
                    if !allow_attribute || i != last {
                        return Err(path_error(source, "attribute step not allowed here"));
                    }
                }
                if step == Step::SelfNode && i > 0 {
                    return Err(path_error(source, "'.' may only start a path"));
                }
                steps.push(step);
            }
            if steps.first() == Some(&Step::SelfNode) {
                steps.remove(0);
            }
            branches.push(PathExpr { descendant, steps });
        }
        Ok(Self {
            source: source.to_string(),
            branches,
        })
    }
}

fn parse_step(
    source: &str,
    part: &str,
    namespaces: &NamespaceContext,
    default_namespace: Option<&str>,
) -> Result<Step> {
    if part.is_empty() {
        return Err(path_error(source, "empty step"));
    }
    if part == "." {
        return Ok(Step::SelfNode);
    }
    let (attribute, test) = if let Some(rest) = part.strip_prefix('@') {
        (true, rest.trim())
    } else if let Some(rest) = part.strip_prefix("attribute::") {
        (true, rest.trim())
    } else if let Some(rest) = part.strip_prefix("child::") {
        (false, rest.trim())
    } else {
        (false, part)
    };

    let name_test = if test == "*" {
        NameTest::Any
    } else {
        let (prefix, local) = split_qname(test);
        let namespace = match prefix {
            Some(p) => Some(
                namespaces
                    .get_namespace(p)
                    .ok_or_else(|| path_error(source, format!("unbound prefix '{}'", p)))?
                    .to_string(),
            ),
            None if attribute => None,
            None => default_namespace.map(str::to_string),
        };
        if local == "*" && prefix.is_some() {
            NameTest::Namespace(namespace)
        } else if is_valid_ncname(local) {
            NameTest::Name(QName::new(namespace, local))
        } else {
            return Err(path_error(source, format!("invalid name test '{}'", test)));
        }
    };

    Ok(if attribute {
        Step::Attribute(name_test)
    } else {
        Step::Child(name_test)
    })
}

impl fmt::Display for XPathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Walks the owned element tree
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvaluator;

impl DefaultEvaluator {
    fn evaluate_branch<'a>(branch: &PathExpr, context: &'a Element, out: &mut Vec<XPathNode<'a>>) {
        let mut current: Vec<&'a Element> = if branch.descendant {
            context.iter().collect()
        } else {
            vec![context]
        };
        for step in &branch.steps {
            match step {
                Step::SelfNode => {}
                Step::Child(test) => {
                    current = current
                        .iter()
                        .copied()
                        .flat_map(|e| e.children.iter())
                        .filter(|c| test.matches(&c.qname))
                        .collect();
                }
                Step::Attribute(test) => {
                    for element in current.iter().copied() {
                        for (name, value) in &element.attributes {
                            if test.matches(name) {
                                out.push(XPathNode::Attribute {
                                    owner: element,
                                    name,
                                    value,
                                });
                            }
                        }
                    }
                    return;
                }
            }
        }
        out.extend(current.into_iter().map(XPathNode::Element));
    }
}

impl SelectorEvaluator for DefaultEvaluator {
    fn evaluate<'a>(&self, path: &XPathSelector, context: &'a Element) -> Vec<XPathNode<'a>> {
        let mut nodes = Vec::new();
        for branch in &path.branches {
            Self::evaluate_branch(branch, context, &mut nodes);
        }
        nodes.sort_by_key(|n| n.position());
        nodes.dedup_by_key(|n| n.position());
        nodes
    }
}
