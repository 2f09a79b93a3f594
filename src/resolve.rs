//! Inheritance resolution.
//!
//! [`resolve`] builds a scoped symbol table over a [`ClassTree`] and
//! links every class to its parent up front, so unknown parents and
//! cycles are reported before any merging happens. Effective property
//! sets are then computed on demand with [`Resolved::class`] or all at
//! once with [`Resolved::resolve_all`].
//!
//! Symbols are recorded with the position of the statement that
//! introduced them. A parent reference sees the most recent symbol
//! declared before it, so `delete Foo;` only hides `Foo` from the
//! statements that follow. A name that is not declared yet falls
//! through to its first later declaration, which is what allows
//! forward references between sibling classes.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, trace};

use crate::ast::{ClassKind, ClassNode, ClassTree, Operator, Property, Value};
use crate::query::Pattern;

/// Classifies a resolver error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveErrorKind {
    /// The parent name is not visible from the class's scope.
    UnknownParent { parent: String },
    /// Following parents leads back to the starting class. Holds the
    /// qualified paths of the classes on the cycle.
    CyclicInheritance { cycle: Vec<String> },
    /// `+=` or `-=` applied to a property that is not an array at
    /// that point of the chain.
    ArrayOperatorOnScalar {
        property: String,
        operator: &'static str,
    },
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownParent { parent } => {
                write!(f, "unknown parent class '{parent}'")
            }
            Self::CyclicInheritance { cycle } => {
                write!(f, "cyclic inheritance: {}", cycle.join(" -> "))?;
                if let Some(first) = cycle.first() {
                    write!(f, " -> {first}")?;
                }
                Ok(())
            }
            Self::ArrayOperatorOnScalar { property, operator } => {
                write!(
                    f,
                    "'{operator}' on property '{property}', which is not \
                     an inherited array"
                )
            }
        }
    }
}

/// Error produced during inheritance resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} in {}", location(path))]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    /// Qualified path of the offending class; empty for file scope.
    pub path: String,
}

fn location(path: &str) -> &str {
    if path.is_empty() { "file scope" } else { path }
}

/// A class with its inheritance chain merged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedClass {
    pub name: String,
    /// Qualified path, `/`-separated (`CfgVehicles/Car`).
    pub path: String,
    /// Qualified path of the linked parent.
    pub parent: Option<String>,
    /// Effective properties in first-declaration order.
    pub properties: Vec<(String, Value)>,
    /// Effective nested class names: inherited first, then own,
    /// without those deleted along the chain.
    pub classes: Vec<String>,
}

impl ResolvedClass {
    /// Effective value of a property (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Class(usize),
    Deleted,
}

#[derive(Debug, Default)]
struct Scope {
    outer: Option<usize>,
    /// Class whose body this is; `None` for file scope.
    owner: Option<usize>,
    /// Lowercased name to `(statement, symbol)` in file order.
    symbols: HashMap<String, Vec<(usize, Symbol)>>,
    /// Lowercased names in first-declaration order.
    order: Vec<String>,
}

impl Scope {
    fn latest(&self, key: &str) -> Option<Symbol> {
        self.symbols.get(key)?.last().map(|&(_, symbol)| symbol)
    }

    fn at(&self, key: &str, statement: usize) -> Option<Symbol> {
        let history = self.symbols.get(key)?;
        history
            .iter()
            .rev()
            .find(|(at, _)| *at <= statement)
            .or_else(|| history.first())
            .map(|&(_, symbol)| symbol)
    }

    fn record(&mut self, key: String, statement: usize, symbol: Symbol) {
        match self.symbols.entry(key) {
            MapEntry::Occupied(slot) => slot.into_mut().push((statement, symbol)),
            MapEntry::Vacant(slot) => {
                self.order.push(slot.key().clone());
                slot.insert(vec![(statement, symbol)]);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Pending,
    InProgress,
    Done(Option<usize>),
}

#[derive(Debug)]
struct ClassEntry<'a> {
    name: &'a str,
    path: String,
    /// Scope the class is declared in.
    outer: usize,
    /// Scope holding the class's own members.
    scope: usize,
    /// Most recent explicit parent and the statement naming it.
    parent: Option<(&'a str, usize)>,
    /// Every definition of the class in file order.
    bodies: Vec<&'a ClassNode>,
    forward: bool,
}

/// Linked symbol table over a parsed tree.
#[derive(Debug)]
pub struct Resolved<'a> {
    tree: &'a ClassTree,
    scopes: Vec<Scope>,
    entries: Vec<ClassEntry<'a>>,
    links: Vec<Link>,
}

/// Build the symbol table for `tree` and link every class to its
/// parent.
///
/// # Errors
///
/// Returns `ResolveError` for the first class whose parent cannot be
/// found or whose chain is cyclic.
pub fn resolve(tree: &ClassTree) -> Result<Resolved<'_>, ResolveError> {
    let mut resolved = Resolved {
        tree,
        scopes: vec![Scope::default()],
        entries: Vec::new(),
        links: Vec::new(),
    };
    let mut statement = 0;
    resolved.collect(0, &tree.classes, &mut statement);

    let mut stack = Vec::new();
    for id in 0..resolved.entries.len() {
        resolved.ensure_linked(id, &mut stack)?;
    }

    debug!(
        classes = resolved.entries.len(),
        scopes = resolved.scopes.len(),
        "linked class tree"
    );
    Ok(resolved)
}

impl<'a> Resolved<'a> {
    fn collect(&mut self, scope: usize, classes: &'a [ClassNode], statement: &mut usize) {
        for node in classes {
            *statement += 1;
            let at = *statement;
            let key = node.name.to_ascii_lowercase();
            let current = self.scopes[scope].latest(&key);

            match node.kind {
                ClassKind::Delete => {
                    trace!(name = %node.name, "deleted class");
                    self.scopes[scope].record(key, at, Symbol::Deleted);
                }
                ClassKind::Forward => {
                    if !matches!(current, Some(Symbol::Class(_))) {
                        self.add_entry(scope, node, key, at);
                    }
                }
                ClassKind::Definition => {
                    let id = match current {
                        Some(Symbol::Class(id)) => id,
                        _ => self.add_entry(scope, node, key, at),
                    };
                    let entry = &mut self.entries[id];
                    entry.forward = false;
                    entry.bodies.push(node);
                    if let Some(parent) = &node.parent {
                        entry.parent = Some((parent.as_str(), at));
                    }
                    let inner = entry.scope;
                    self.collect(inner, &node.classes, statement);
                }
            }
        }
    }

    fn add_entry(&mut self, scope: usize, node: &'a ClassNode, key: String, at: usize) -> usize {
        let id = self.entries.len();
        let inner = self.scopes.len();
        let path = match self.scopes[scope].owner {
            Some(owner) => format!("{}/{}", self.entries[owner].path, node.name),
            None => node.name.clone(),
        };

        self.scopes.push(Scope {
            outer: Some(scope),
            owner: Some(id),
            ..Scope::default()
        });
        self.entries.push(ClassEntry {
            name: &node.name,
            path,
            outer: scope,
            scope: inner,
            parent: None,
            bodies: Vec::new(),
            forward: node.kind == ClassKind::Forward,
        });
        self.links.push(Link::Pending);
        self.scopes[scope].record(key, at, Symbol::Class(id));
        id
    }

    /// Link `id` (and its whole chain) if needed, returning its parent.
    /// The chain is walked upward in a loop and linked on the way back,
    /// so long chains do not deepen the call stack.
    fn ensure_linked(
        &mut self,
        id: usize,
        stack: &mut Vec<usize>,
    ) -> Result<Option<usize>, ResolveError> {
        let mut walked = Vec::new();
        let mut current = Some(id);

        while let Some(node) = current {
            match self.links[node] {
                Link::Done(_) => break,
                Link::InProgress => {
                    let start = stack.iter().position(|&s| s == node).unwrap_or(0);
                    let cycle = stack[start..]
                        .iter()
                        .map(|&s| self.entries[s].path.clone())
                        .collect();
                    return Err(ResolveError {
                        kind: ResolveErrorKind::CyclicInheritance { cycle },
                        path: self.entries[node].path.clone(),
                    });
                }
                Link::Pending => {}
            }

            self.links[node] = Link::InProgress;
            stack.push(node);
            let parent = match self.entries[node].parent {
                Some((name, at)) => Some(self.lookup(node, name, at, stack)?),
                None => None,
            };
            walked.push((node, parent));
            current = parent;
        }

        for (node, parent) in walked.into_iter().rev() {
            stack.pop();
            self.links[node] = Link::Done(parent);
            trace!(
                class = %self.entries[node].path,
                parent = parent.map(|p| self.entries[p].path.as_str()),
                "linked class"
            );
        }
        Ok(self.parent(id))
    }

    /// Find the class `name` refers to when written as the parent of
    /// `id` at statement `at`.
    fn lookup(
        &mut self,
        id: usize,
        name: &str,
        at: usize,
        stack: &mut Vec<usize>,
    ) -> Result<usize, ResolveError> {
        let key = name.to_ascii_lowercase();
        let path = self.entries[id].path.clone();
        let unknown = || ResolveError {
            kind: ResolveErrorKind::UnknownParent {
                parent: name.to_string(),
            },
            path: path.clone(),
        };

        let mut scope = self.entries[id].outer;
        match self.scopes[scope].at(&key, at) {
            Some(Symbol::Class(found)) if found != id => return Ok(found),
            Some(Symbol::Deleted) => return Err(unknown()),
            _ => {}
        }

        loop {
            if let Some(owner) = self.scopes[scope].owner {
                if let Some(found) = self.inherited_class(owner, &key, stack)? {
                    return Ok(found);
                }
            }
            let Some(outer) = self.scopes[scope].outer else {
                break;
            };
            scope = outer;
            match self.scopes[scope].at(&key, at) {
                Some(Symbol::Class(found)) => return Ok(found),
                Some(Symbol::Deleted) => return Err(unknown()),
                None => {}
            }
        }

        Err(unknown())
    }

    /// Nested class `key` that `owner` inherits from its ancestors.
    fn inherited_class(
        &mut self,
        owner: usize,
        key: &str,
        stack: &mut Vec<usize>,
    ) -> Result<Option<usize>, ResolveError> {
        let mut current = self.ensure_linked(owner, stack)?;
        while let Some(ancestor) = current {
            match self.scopes[self.entries[ancestor].scope].latest(key) {
                Some(Symbol::Class(found)) => return Ok(Some(found)),
                Some(Symbol::Deleted) => return Ok(None),
                None => current = self.ensure_linked(ancestor, stack)?,
            }
        }
        Ok(None)
    }

    fn parent(&self, id: usize) -> Option<usize> {
        match self.links[id] {
            Link::Done(parent) => parent,
            Link::Pending | Link::InProgress => None,
        }
    }

    /// Live class ids declared directly in `scope`, in declaration
    /// order.
    fn members(&self, scope: usize) -> impl Iterator<Item = usize> + '_ {
        let scope = &self.scopes[scope];
        scope.order.iter().filter_map(|key| match scope.latest(key) {
            Some(Symbol::Class(id)) => Some(id),
            _ => None,
        })
    }

    /// Every live class, depth-first in declaration order.
    fn live(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut pending: Vec<usize> = self.members(0).collect();
        pending.reverse();
        while let Some(id) = pending.pop() {
            out.push(id);
            let mut children: Vec<usize> = self.members(self.entries[id].scope).collect();
            children.reverse();
            pending.extend(children);
        }
        out
    }

    fn find(&self, path: &str) -> Option<usize> {
        let mut scope = 0;
        let mut found = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match self.scopes[scope].latest(&segment.to_ascii_lowercase())? {
                Symbol::Class(id) => {
                    scope = self.entries[id].scope;
                    found = Some(id);
                }
                Symbol::Deleted => return None,
            }
        }
        found
    }

    /// Whether `id` is still reachable by its path.
    fn is_live(&self, id: usize) -> bool {
        self.find(&self.entries[id].path) == Some(id)
    }

    /// Ancestors of `id` from the most distant down to `id` itself.
    fn chain(&self, id: usize) -> Vec<usize> {
        let mut chain = vec![id];
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            chain.push(ancestor);
            current = self.parent(ancestor);
        }
        chain.reverse();
        chain
    }

    fn merge(&self, id: usize) -> Result<ResolvedClass, ResolveError> {
        let chain = self.chain(id);
        let mut properties = PropertySet::default();
        let mut classes: Vec<String> = Vec::new();

        for &link in &chain {
            let entry = &self.entries[link];
            for body in &entry.bodies {
                for property in &body.properties {
                    properties.apply(property, &entry.path)?;
                }
            }

            let scope = &self.scopes[entry.scope];
            for key in &scope.order {
                let position = classes.iter().position(|c| c.eq_ignore_ascii_case(key));
                match (scope.latest(key), position) {
                    (Some(Symbol::Class(child)), None) => {
                        classes.push(self.entries[child].name.to_string());
                    }
                    (Some(Symbol::Deleted), Some(index)) => {
                        classes.remove(index);
                    }
                    _ => {}
                }
            }
        }

        let entry = &self.entries[id];
        Ok(ResolvedClass {
            name: entry.name.to_string(),
            path: entry.path.clone(),
            parent: self.parent(id).map(|p| self.entries[p].path.clone()),
            properties: properties.into_vec(),
            classes,
        })
    }

    /// Effective properties of the class at `path` (`Outer/Inner`,
    /// case-insensitive). `Ok(None)` if no live class has that path.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` when an array operator in the chain
    /// targets a scalar or undeclared property.
    pub fn class(&self, path: &str) -> Result<Option<ResolvedClass>, ResolveError> {
        self.find(path).map(|id| self.merge(id)).transpose()
    }

    /// Resolve every live class, keyed by qualified path.
    ///
    /// # Errors
    ///
    /// See [`Resolved::class`].
    pub fn resolve_all(&self) -> Result<BTreeMap<String, ResolvedClass>, ResolveError> {
        self.live()
            .into_iter()
            .map(|id| self.merge(id).map(|class| (class.path.clone(), class)))
            .collect()
    }

    /// File-scope properties (including `enum` entries) and top-level
    /// class names. The result has an empty name and path.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if a file-scope `+=`/`-=` has nothing to
    /// operate on.
    pub fn root(&self) -> Result<ResolvedClass, ResolveError> {
        let mut properties = PropertySet::default();
        for property in &self.tree.properties {
            properties.apply(property, "")?;
        }
        Ok(ResolvedClass {
            name: String::new(),
            path: String::new(),
            parent: None,
            properties: properties.into_vec(),
            classes: self
                .members(0)
                .map(|id| self.entries[id].name.to_string())
                .collect(),
        })
    }

    /// Qualified paths of every live class, depth-first.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.live()
            .into_iter()
            .map(|id| self.entries[id].path.as_str())
            .collect()
    }

    /// Paths of live classes matching `pattern`.
    #[must_use]
    pub fn select(&self, pattern: &Pattern) -> Vec<&str> {
        self.paths()
            .into_iter()
            .filter(|path| pattern.matches(path))
            .collect()
    }

    /// Produce a tree where every live class carries its effective
    /// properties as plain assignments. Reopened definitions collapse
    /// into one node and deleted classes are dropped. A parent name is
    /// kept only while that parent is still live, so the result always
    /// resolves again with the same effective properties.
    ///
    /// # Errors
    ///
    /// See [`Resolved::class`].
    pub fn flatten(&self) -> Result<ClassTree, ResolveError> {
        let mut tree = ClassTree {
            properties: assignments(self.root()?.properties),
            classes: self.flatten_scope(0)?,
        };

        // a name can reach a different class once links above it are
        // gone; such parents are cut until every link matches
        loop {
            let stale = match resolve(&tree) {
                Ok(relinked) => relinked.first_relinked(self),
                Err(err) => Some(err.path),
            };
            let Some(path) = stale else {
                break;
            };
            if !cut_parent(&mut tree.classes, &path) {
                break;
            }
            trace!(class = %path, "cut parent from flattened class");
        }
        Ok(tree)
    }

    /// First live class whose parent is not the one it has in
    /// `original`.
    fn first_relinked(&self, original: &Resolved<'_>) -> Option<String> {
        self.live().into_iter().find_map(|id| {
            let path = &self.entries[id].path;
            let here = self.parent(id).map(|p| self.entries[p].path.as_str());
            let before = original
                .find(path)
                .and_then(|o| original.parent(o))
                .map(|p| original.entries[p].path.as_str());
            (here.is_some() && here != before).then(|| path.clone())
        })
    }

    fn flatten_scope(&self, scope: usize) -> Result<Vec<ClassNode>, ResolveError> {
        self.members(scope)
            .map(|id| {
                let entry = &self.entries[id];
                let kind = if entry.forward {
                    ClassKind::Forward
                } else {
                    ClassKind::Definition
                };
                let properties = if entry.forward {
                    Vec::new()
                } else {
                    assignments(self.merge(id)?.properties)
                };
                let parent = entry
                    .parent
                    .filter(|_| self.parent(id).is_some_and(|p| self.is_live(p)))
                    .map(|(name, _)| name.to_string());
                Ok(ClassNode {
                    name: entry.name.to_string(),
                    parent,
                    kind,
                    properties,
                    classes: self.flatten_scope(entry.scope)?,
                })
            })
            .collect()
    }
}

/// Clear the parent of the class at `path`, reporting whether there
/// was one.
fn cut_parent(classes: &mut [ClassNode], path: &str) -> bool {
    let (head, rest) = path
        .split_once('/')
        .map_or((path, None), |(head, rest)| (head, Some(rest)));
    let Some(node) = classes.iter_mut().find(|c| c.is_named(head)) else {
        return false;
    };
    match rest {
        Some(rest) => cut_parent(&mut node.classes, rest),
        None => node.parent.take().is_some(),
    }
}

fn assignments(properties: Vec<(String, Value)>) -> Vec<Property> {
    properties
        .into_iter()
        .map(|(name, value)| Property {
            name,
            operator: Operator::Set,
            value,
        })
        .collect()
}

/// Ordered, case-insensitive property accumulator.
#[derive(Debug, Default)]
struct PropertySet {
    values: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl PropertySet {
    fn apply(&mut self, property: &Property, path: &str) -> Result<(), ResolveError> {
        let key = property.name.to_ascii_lowercase();
        let slot = self.index.get(&key).copied();

        if property.operator == Operator::Set {
            match slot {
                Some(i) => self.values[i].1 = property.value.clone(),
                None => {
                    self.index.insert(key, self.values.len());
                    self.values
                        .push((property.name.clone(), property.value.clone()));
                }
            }
            return Ok(());
        }

        let operand = property.value.as_array().unwrap_or_default();
        let current = match slot.map(|i| &mut self.values[i].1) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ResolveError {
                    kind: ResolveErrorKind::ArrayOperatorOnScalar {
                        property: property.name.clone(),
                        operator: property.operator.symbol(),
                    },
                    path: path.to_string(),
                });
            }
        };

        if property.operator == Operator::Append {
            current.extend(operand.iter().cloned());
        } else {
            current.retain(|item| !operand.iter().any(|o| o.matches(item)));
        }
        Ok(())
    }

    fn into_vec(self) -> Vec<(String, Value)> {
        self.values
    }
}
