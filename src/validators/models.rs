//! Content model automata
//!
//! A model group is compiled once per complex type into a deterministic
//! automaton over child element names:
//!
//! 1. group references are expanded and every element or wildcard term
//!    becomes a *leaf*;
//! 2. a repeated element or wildcard (alone or as the only particle of a
//!    group) becomes one *counted* position; other occurrence ranges are
//!    unrolled into positions (`(a, b){2,3}` becomes `a b a b (a b)?`),
//!    bounded by `max_occurs_expansion`;
//! 3. first/last/follow sets over the positions give a position automaton,
//!    determinized by subset construction over `(position, count)` pairs,
//!    bounded by `max_automaton_states` and `max_automaton_work`.
//!
//! Each transition records which leaf the child is attributed to. When a
//! name matches both an element and a wildcard the element wins; when it
//! matches two different leaves otherwise, the leftmost leaf wins and a
//! warning is logged.
//!
//! `xs:all` groups are not unrolled; they run on per-particle counters.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#coss-particle

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, warn};

use crate::error::{Result, SchemaError, SchemaErrorKind};
use crate::limits::Limits;
use crate::namespaces::QName;

use super::base::{ElementId, GroupId};
use super::globals::ComponentTable;
use super::groups::{Compositor, ModelGroup};
use super::particles::{Occurs, Particle, Term};
use super::wildcards::Wildcard;

/// A term a child element can be attributed to
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Element declaration, with every name it accepts
    Element {
        /// The declaration in the model
        decl: ElementId,
        /// Accepted names: the declaration itself and its substitutes
        names: BTreeMap<QName, ElementId>,
    },
    /// Element wildcard
    Wildcard(Wildcard),
}

impl Leaf {
    /// The wildcard, if this leaf is one
    pub fn wildcard(&self) -> Option<&Wildcard> {
        match self {
            Leaf::Wildcard(w) => Some(w),
            _ => None,
        }
    }

    fn describe(&self, table: &ComponentTable) -> String {
        match self {
            Leaf::Element { decl, .. } => table.element(*decl).name.to_string(),
            Leaf::Wildcard(w) => w.to_string(),
        }
    }

    fn is_element(&self) -> bool {
        matches!(self, Leaf::Element { .. })
    }

    fn matches(&self, symbol: &Symbol) -> bool {
        match (self, symbol) {
            (Leaf::Element { names, .. }, Symbol::Name(q)) => names.contains_key(q),
            (Leaf::Element { .. }, _) => false,
            (Leaf::Wildcard(w), Symbol::Name(q)) => w.matches(q),
            (Leaf::Wildcard(w), Symbol::Namespace(ns)) => w.matches_namespace(ns.as_deref()),
            (Leaf::Wildcard(w), Symbol::Unlisted) => w.matches_unlisted(),
        }
    }
}

/// Which leaf a child was attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution {
    /// Leaf index in the model
    pub leaf: usize,
    /// Matched declaration; `None` for wildcard matches
    pub element: Option<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Symbol {
    Name(QName),
    Namespace(Option<String>),
    Unlisted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    target: usize,
    attribution: Attribution,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct DfaState {
    accepting: bool,
    names: BTreeMap<QName, Edge>,
    namespaces: BTreeMap<Option<String>, Edge>,
    unlisted: Option<Edge>,
    expected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct AllParticle {
    leaf: usize,
    occurs: Occurs,
}

#[derive(Debug, Clone, PartialEq)]
enum ModelKind {
    Dfa {
        states: Vec<DfaState>,
        names: BTreeSet<QName>,
        namespaces: BTreeSet<Option<String>>,
    },
    All {
        particles: Vec<AllParticle>,
        optional: bool,
        expected: Vec<String>,
    },
}

/// A compiled content model
#[derive(Debug, Clone, PartialEq)]
pub struct ContentModel {
    leaves: Vec<Leaf>,
    kind: ModelKind,
}

/// Intermediate tree with leaves numbered and group references expanded
enum Node {
    Leaf(usize, Occurs),
    Group(Compositor, Vec<Node>, Occurs),
}

impl Node {
    fn occurs(&self) -> Occurs {
        match self {
            Node::Leaf(_, o) | Node::Group(_, _, o) => *o,
        }
    }

    /// The leaf and its overall range when the node repeats a single leaf
    fn single_leaf(&self) -> Option<(usize, Occurs)> {
        match self {
            Node::Leaf(leaf, occurs) => Some((*leaf, *occurs)),
            Node::Group(_, children, outer) => match children.as_slice() {
                [child] => {
                    let (leaf, inner) = child.single_leaf()?;
                    if inner == Occurs::once() {
                        Some((leaf, *outer))
                    } else if *outer == Occurs::once() {
                        Some((leaf, inner))
                    } else {
                        None
                    }
                }
                _ => None,
            },
        }
    }
}

/// Ranges that a plain position with `?` or `*` cannot express
fn is_counted(occurs: Occurs) -> bool {
    occurs.min > 1 || occurs.max.map_or(false, |max| max > 1)
}

/// Count after one more match of a counted position
fn next_count(count: u32, occurs: Occurs) -> Option<u32> {
    match occurs.max {
        Some(max) if count >= max => None,
        Some(_) => Some(count + 1),
        None => Some((count + 1).min(occurs.min.max(1))),
    }
}

/// Unrolled regular expression over positions
enum Re {
    Leaf(usize),
    Counted(usize, Occurs),
    Seq(Vec<Re>),
    Alt(Vec<Re>),
    Star(Box<Re>),
    Opt(Box<Re>),
}

struct Glushkov {
    nullable: bool,
    first: BTreeSet<usize>,
    last: BTreeSet<usize>,
}

struct Compiler<'a> {
    table: &'a ComponentTable,
    limits: &'a Limits,
    leaves: Vec<Leaf>,
    /// Position to leaf
    positions: Vec<usize>,
    /// Occurrence range of each counted position
    counters: BTreeMap<usize, Occurs>,
    group_stack: Vec<GroupId>,
}

fn model_error(message: impl Into<String>) -> crate::error::Error {
    SchemaError::new(SchemaErrorKind::InvalidContentModel, message).into()
}

impl<'a> Compiler<'a> {
    fn new(table: &'a ComponentTable, limits: &'a Limits) -> Self {
        Self {
            table,
            limits,
            leaves: Vec::new(),
            positions: Vec::new(),
            counters: BTreeMap::new(),
            group_stack: Vec::new(),
        }
    }

    fn leaf_for_element(&mut self, id: ElementId) -> usize {
        let decl = self.table.element(id);
        let mut names = BTreeMap::new();
        if !decl.is_abstract {
            names.insert(decl.name.clone(), id);
        }
        for member in self.table.substitution_members(id) {
            let member_decl = self.table.element(*member);
            names
                .entry(member_decl.name.clone())
                .or_insert(*member);
        }
        self.leaves.push(Leaf::Element { decl: id, names });
        self.leaves.len() - 1
    }

    fn node(&mut self, particle: &Particle) -> Result<Node> {
        match &particle.term {
            Term::Element(id) => Ok(Node::Leaf(self.leaf_for_element(*id), particle.occurs)),
            Term::Wildcard(w) => {
                self.leaves.push(Leaf::Wildcard(w.clone()));
                Ok(Node::Leaf(self.leaves.len() - 1, particle.occurs))
            }
            Term::Model(group) => self.group_node(group, particle.occurs),
            Term::Group(id) => {
                if self.group_stack.contains(id) {
                    return Err(SchemaError::new(
                        SchemaErrorKind::UnresolvableDerivation,
                        format!("group {} contains itself", self.table.group(*id).name),
                    )
                    .into());
                }
                self.group_stack.push(*id);
                let table = self.table;
                let node = self.group_node(&table.group(*id).model, particle.occurs);
                self.group_stack.pop();
                node
            }
        }
    }

    fn group_node(&mut self, group: &ModelGroup, occurs: Occurs) -> Result<Node> {
        if group.compositor == Compositor::All {
            return Err(model_error(
                "an 'all' group must be the whole content model of a type",
            ));
        }
        let children = group
            .particles
            .iter()
            .map(|p| self.node(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Node::Group(group.compositor, children, occurs))
    }

    fn new_position(&mut self, leaf: usize) -> Result<usize> {
        self.positions.push(leaf);
        self.limits.check_occurs_expansion(self.positions.len())?;
        Ok(self.positions.len() - 1)
    }

    fn expand(&mut self, node: &Node) -> Result<Re> {
        let occurs = node.occurs();
        let mut parts = Vec::new();
        if occurs.max == Some(0) {
            return Ok(Re::Seq(parts));
        }
        if let Some((leaf, range)) = node.single_leaf() {
            if is_counted(range) {
                let position = self.new_position(leaf)?;
                self.counters.insert(position, range);
                return Ok(Re::Counted(position, range));
            }
        }
        for _ in 0..occurs.min {
            parts.push(self.expand_once(node)?);
        }
        match occurs.max {
            None => parts.push(Re::Star(Box::new(self.expand_once(node)?))),
            Some(max) => {
                for _ in occurs.min..max {
                    parts.push(Re::Opt(Box::new(self.expand_once(node)?)));
                }
            }
        }
        Ok(Re::Seq(parts))
    }

    fn expand_once(&mut self, node: &Node) -> Result<Re> {
        match node {
            Node::Leaf(leaf, _) => Ok(Re::Leaf(self.new_position(*leaf)?)),
            Node::Group(compositor, children, _) => {
                let parts = children
                    .iter()
                    .map(|c| self.expand(c))
                    .collect::<Result<Vec<_>>>()?;
                Ok(match compositor {
                    Compositor::Choice => Re::Alt(parts),
                    _ => Re::Seq(parts),
                })
            }
        }
    }
}

fn analyze(re: &Re, follow: &mut Vec<BTreeSet<usize>>) -> Glushkov {
    match re {
        Re::Leaf(p) => Glushkov {
            nullable: false,
            first: BTreeSet::from([*p]),
            last: BTreeSet::from([*p]),
        },
        Re::Counted(p, occurs) => Glushkov {
            nullable: occurs.min == 0,
            first: BTreeSet::from([*p]),
            last: BTreeSet::from([*p]),
        },
        Re::Seq(items) => {
            let mut acc = Glushkov {
                nullable: true,
                first: BTreeSet::new(),
                last: BTreeSet::new(),
            };
            for item in items {
                let next = analyze(item, follow);
                for p in &acc.last {
                    follow[*p].extend(next.first.iter().copied());
                }
                if acc.nullable {
                    acc.first.extend(next.first.iter().copied());
                }
                acc.last = if next.nullable {
                    acc.last.union(&next.last).copied().collect()
                } else {
                    next.last
                };
                acc.nullable = acc.nullable && next.nullable;
            }
            acc
        }
        Re::Alt(items) => {
            let mut acc = Glushkov {
                nullable: items.is_empty(),
                first: BTreeSet::new(),
                last: BTreeSet::new(),
            };
            for item in items {
                let next = analyze(item, follow);
                acc.nullable |= next.nullable;
                acc.first.extend(next.first);
                acc.last.extend(next.last);
            }
            acc
        }
        Re::Star(inner) => {
            let g = analyze(inner, follow);
            for p in &g.last {
                follow[*p].extend(g.first.iter().copied());
            }
            Glushkov {
                nullable: true,
                ..g
            }
        }
        Re::Opt(inner) => Glushkov {
            nullable: true,
            ..analyze(inner, follow)
        },
    }
}

/// Top-level `all` group of a content model, with its occurrence range
fn top_level_all<'g>(
    group: &'g ModelGroup,
    table: &'g ComponentTable,
) -> Option<(&'g ModelGroup, Occurs)> {
    if group.compositor == Compositor::All {
        return Some((group, Occurs::once()));
    }
    match group.particles.as_slice() {
        [single] if group.compositor == Compositor::Sequence => match &single.term {
            Term::Model(inner) if inner.compositor == Compositor::All => {
                Some((inner, single.occurs))
            }
            Term::Group(id) if table.group(*id).model.compositor == Compositor::All => {
                Some((&table.group(*id).model, single.occurs))
            }
            _ => None,
        },
        _ => None,
    }
}

impl ContentModel {
    /// Compile a model group
    pub fn compile(group: &ModelGroup, table: &ComponentTable, limits: &Limits) -> Result<Self> {
        let mut compiler = Compiler::new(table, limits);

        if let Some((all, occurs)) = top_level_all(group, table) {
            return Self::compile_all(compiler, all, occurs);
        }

        let root = compiler.group_node(group, Occurs::once())?;
        let re = compiler.expand(&root)?;
        let start = compiler.positions.len();
        let mut follow = vec![BTreeSet::new(); start + 1];
        let g = analyze(&re, &mut follow);
        follow[start] = g.first.clone();

        let Compiler {
            leaves,
            positions,
            counters,
            ..
        } = compiler;
        let satisfied = |p: usize, count: u32| counters.get(&p).map_or(true, |o| count >= o.min);

        // Alphabet: every name some leaf accepts explicitly, every namespace
        // some wildcard lists, and one class for everything else.
        let mut names = BTreeSet::new();
        let mut namespaces = BTreeSet::new();
        namespaces.insert(None);
        for leaf in &leaves {
            match leaf {
                Leaf::Element { names: accepted, .. } => names.extend(accepted.keys().cloned()),
                Leaf::Wildcard(w) => {
                    names.extend(w.not_qnames.iter().cloned());
                    namespaces.extend(w.namespaces.listed().cloned());
                }
            }
        }
        let mut symbols: Vec<Symbol> = names.iter().cloned().map(Symbol::Name).collect();
        symbols.extend(namespaces.iter().cloned().map(Symbol::Namespace));
        symbols.push(Symbol::Unlisted);

        // Subsets are over (position, count); uncounted positions count 1.
        let mut index: BTreeMap<BTreeSet<(usize, u32)>, usize> = BTreeMap::new();
        let mut sets: Vec<BTreeSet<(usize, u32)>> = Vec::new();
        let mut states: Vec<DfaState> = Vec::new();
        let mut queue = VecDeque::new();
        let mut work = 0usize;

        let start_set = BTreeSet::from([(start, 0)]);
        index.insert(start_set.clone(), 0);
        sets.push(start_set);
        states.push(DfaState {
            accepting: g.nullable,
            ..DfaState::default()
        });
        queue.push_back(0usize);

        while let Some(state) = queue.pop_front() {
            let mut reachable = BTreeSet::new();
            for &(p, count) in &sets[state] {
                if let Some(next) = counters.get(&p).and_then(|o| next_count(count, *o)) {
                    reachable.insert((p, next));
                }
                if satisfied(p, count) {
                    work += follow[p].len();
                    reachable.extend(follow[p].iter().map(|q| (*q, 1)));
                }
            }
            limits.check_automaton_work(work)?;

            let mut expected = Vec::new();
            for symbol in &symbols {
                let mut candidates: BTreeSet<(usize, u32)> = reachable
                    .iter()
                    .filter(|(p, _)| leaves[positions[*p]].matches(symbol))
                    .copied()
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                if candidates.iter().any(|(p, _)| leaves[positions[*p]].is_element()) {
                    candidates.retain(|(p, _)| leaves[positions[*p]].is_element());
                }
                let origins: BTreeSet<usize> =
                    candidates.iter().map(|(p, _)| positions[*p]).collect();
                let leaf = *origins.iter().next().unwrap_or(&0);
                if origins.len() > 1 {
                    warn!(
                        symbol = ?symbol,
                        leaves = origins.len(),
                        "ambiguous content model, attributing to the leftmost particle"
                    );
                }
                let element = match (&leaves[leaf], symbol) {
                    (Leaf::Element { names, .. }, Symbol::Name(q)) => names.get(q).copied(),
                    _ => None,
                };

                let target = match index.get(&candidates) {
                    Some(t) => *t,
                    None => {
                        let t = sets.len();
                        limits.check_automaton_states(t + 1)?;
                        index.insert(candidates.clone(), t);
                        states.push(DfaState {
                            accepting: candidates
                                .iter()
                                .any(|(p, count)| g.last.contains(p) && satisfied(*p, *count)),
                            ..DfaState::default()
                        });
                        sets.push(candidates);
                        queue.push_back(t);
                        t
                    }
                };

                let description = match element {
                    Some(e) => table.element(e).name.to_string(),
                    None => leaves[leaf].describe(table),
                };
                if !expected.contains(&description) {
                    expected.push(description);
                }

                let edge = Edge {
                    target,
                    attribution: Attribution { leaf, element },
                };
                match symbol {
                    Symbol::Name(q) => {
                        states[state].names.insert(q.clone(), edge);
                    }
                    Symbol::Namespace(ns) => {
                        states[state].namespaces.insert(ns.clone(), edge);
                    }
                    Symbol::Unlisted => states[state].unlisted = Some(edge),
                }
            }
            states[state].expected = expected;
        }

        debug!(
            leaves = leaves.len(),
            positions = positions.len(),
            counted = counters.len(),
            states = states.len(),
            "compiled content model"
        );

        Ok(Self {
            leaves,
            kind: ModelKind::Dfa {
                states,
                names,
                namespaces,
            },
        })
    }

    fn compile_all(mut compiler: Compiler<'_>, group: &ModelGroup, occurs: Occurs) -> Result<Self> {
        if occurs.max.map_or(true, |m| m > 1) {
            return Err(model_error("an 'all' group may occur at most once"));
        }
        let mut particles = Vec::new();
        for particle in &group.particles {
            let leaf = match &particle.term {
                Term::Element(id) => compiler.leaf_for_element(*id),
                Term::Wildcard(w) => {
                    compiler.leaves.push(Leaf::Wildcard(w.clone()));
                    compiler.leaves.len() - 1
                }
                Term::Group(_) | Term::Model(_) => {
                    return Err(model_error(
                        "an 'all' group may only contain elements and wildcards",
                    ))
                }
            };
            particles.push(AllParticle {
                leaf,
                occurs: particle.occurs,
            });
        }
        let expected = particles
            .iter()
            .map(|p| compiler.leaves[p.leaf].describe(compiler.table))
            .collect();
        Ok(Self {
            leaves: compiler.leaves,
            kind: ModelKind::All {
                particles,
                optional: occurs.min == 0,
                expected,
            },
        })
    }

    /// Leaf behind an attribution
    pub fn leaf(&self, index: usize) -> Option<&Leaf> {
        self.leaves.get(index)
    }

    /// Number of automaton states (0 for `all` models)
    pub fn state_count(&self) -> usize {
        match &self.kind {
            ModelKind::Dfa { states, .. } => states.len(),
            ModelKind::All { .. } => 0,
        }
    }

    /// Start a run over one parent's children
    pub fn start(&self) -> ModelRun<'_> {
        let state = match &self.kind {
            ModelKind::Dfa { .. } => RunState::Dfa(0),
            ModelKind::All { particles, .. } => RunState::All(vec![0; particles.len()]),
        };
        ModelRun { model: self, state }
    }

    /// Check a complete child name sequence
    pub fn accepts<'q>(&self, children: impl IntoIterator<Item = &'q QName>) -> bool {
        let mut run = self.start();
        for name in children {
            if run.step(name).is_err() {
                return false;
            }
        }
        run.finish().is_ok()
    }
}

#[derive(Debug, Clone)]
enum RunState {
    Dfa(usize),
    All(Vec<u32>),
}

/// An in-progress match of children against a content model
#[derive(Debug, Clone)]
pub struct ModelRun<'a> {
    model: &'a ContentModel,
    state: RunState,
}

impl ModelRun<'_> {
    /// Feed the next child; on rejection returns what would have been accepted
    pub fn step(&mut self, name: &QName) -> std::result::Result<Attribution, Vec<String>> {
        match (&self.model.kind, &mut self.state) {
            (
                ModelKind::Dfa {
                    states,
                    names,
                    namespaces,
                },
                RunState::Dfa(current),
            ) => {
                let state = &states[*current];
                let ns = name.namespace.clone();
                let edge = if names.contains(name) {
                    state.names.get(name)
                } else if namespaces.contains(&ns) {
                    state.namespaces.get(&ns)
                } else {
                    state.unlisted.as_ref()
                };
                match edge {
                    Some(edge) => {
                        *current = edge.target;
                        Ok(edge.attribution)
                    }
                    None => Err(state.expected.clone()),
                }
            }
            (ModelKind::All { particles, .. }, RunState::All(counts)) => {
                let leaves = &self.model.leaves;
                let symbol = Symbol::Name(name.clone());
                let found = particles
                    .iter()
                    .position(|p| leaves[p.leaf].is_element() && leaves[p.leaf].matches(&symbol))
                    .or_else(|| {
                        particles
                            .iter()
                            .position(|p| leaves[p.leaf].matches(&symbol))
                    });
                let accepted = found.filter(|i| !particles[*i].occurs.is_exceeded(counts[*i] + 1));
                match accepted {
                    Some(i) => {
                        counts[i] += 1;
                        let element = match &leaves[particles[i].leaf] {
                            Leaf::Element { names, .. } => names.get(name).copied(),
                            Leaf::Wildcard(_) => None,
                        };
                        Ok(Attribution {
                            leaf: particles[i].leaf,
                            element,
                        })
                    }
                    None => Err(particles
                        .iter()
                        .zip(counts.iter())
                        .filter(|(p, c)| !p.occurs.is_exceeded(**c + 1))
                        .map(|(p, _)| describe_leaf(&leaves[p.leaf]))
                        .collect()),
                }
            }
            _ => Err(Vec::new()),
        }
    }

    /// Check the end of the children; on rejection returns what is missing
    pub fn finish(&self) -> std::result::Result<(), Vec<String>> {
        match (&self.model.kind, &self.state) {
            (ModelKind::Dfa { states, .. }, RunState::Dfa(current)) => {
                let state = &states[*current];
                if state.accepting {
                    Ok(())
                } else {
                    Err(state.expected.clone())
                }
            }
            (
                ModelKind::All {
                    particles,
                    optional,
                    ..
                },
                RunState::All(counts),
            ) => {
                if *optional && counts.iter().all(|c| *c == 0) {
                    return Ok(());
                }
                let missing: Vec<String> = particles
                    .iter()
                    .zip(counts.iter())
                    .filter(|(p, c)| **c < p.occurs.min)
                    .map(|(p, _)| describe_leaf(&self.model.leaves[p.leaf]))
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(missing)
                }
            }
            _ => Err(Vec::new()),
        }
    }

    /// Names acceptable at the current point
    pub fn expected(&self) -> Vec<String> {
        match (&self.model.kind, &self.state) {
            (ModelKind::Dfa { states, .. }, RunState::Dfa(current)) => {
                states[*current].expected.clone()
            }
            (ModelKind::All { expected, .. }, _) => expected.clone(),
            _ => Vec::new(),
        }
    }
}

fn describe_leaf(leaf: &Leaf) -> String {
    match leaf {
        Leaf::Element { names, .. } => names
            .keys()
            .next()
            .map(|q| q.to_string())
            .unwrap_or_else(|| "element".to_string()),
        Leaf::Wildcard(w) => w.to_string(),
    }
}
