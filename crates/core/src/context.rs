//! Layered context
//!
//! State visible to processes is split in two layers, composed by a
//! [`SystemContext`]:
//!
//! - [`GlobalContext`]: configuration-like values fixed at construction. There
//!   is no mutator; it is shared by reference only.
//! - [`DomainContext`]: the mutable working state. Containers are stored in an
//!   [`Arena`] so the transaction layer can shadow them one at a time.
//!
//! Paths into a system context are rooted at the layer name:
//! `global.tax_rate`, `domain.items[2].count`.
//!
//! ## Direct Mutation
//!
//! `DomainContext::set`, `remove` and `push` are the *unguarded* mutators.
//! Each takes the engine's [`LockManager`] and consults it before touching
//! anything. Inside a process, writes go through the contract guard and the
//! transaction instead, and never reach these methods.

use crate::arena::{Arena, Container, Handle, Node};
use crate::error::{Error, Result};
use crate::lock::LockManager;
use crate::path::{FieldPath, PathSegment};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Layer
// ============================================================================

/// One of the two context layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    /// Immutable configuration layer
    Global,
    /// Mutable working-state layer
    Domain,
}

impl Layer {
    /// Path prefix of this layer
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Global => "global",
            Layer::Domain => "domain",
        }
    }

    /// Root path of this layer
    pub fn root_path(&self) -> FieldPath {
        FieldPath::root().key(self.as_str())
    }

    /// Parse a layer name
    pub fn from_name(name: &str) -> Option<Layer> {
        match name {
            "global" => Some(Layer::Global),
            "domain" => Some(Layer::Domain),
            _ => None,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// GlobalContext
// ============================================================================

/// Immutable configuration layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalContext {
    values: BTreeMap<String, Value>,
}

impl GlobalContext {
    /// Create from a field map
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Create an empty layer
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create from a value, which must be a map
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(values) => Ok(Self { values }),
            other => Err(Error::type_mismatch("global", "Map", other.type_name())),
        }
    }

    /// Create from a JSON object
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Self::from_value(Value::from(json))
    }

    /// Get a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get the value at a path relative to this layer
    pub fn get_path(&self, path: &FieldPath) -> Result<Value> {
        let mut current_path = Layer::Global.root_path();
        let mut segments = path.segments().iter();
        let first = match segments.next() {
            Some(PathSegment::Key(k)) => k,
            Some(PathSegment::Index(_)) => {
                return Err(Error::type_mismatch(current_path, "List", "Map"))
            }
            None => return Ok(self.to_value()),
        };
        current_path.push_key(first.clone());
        let mut current = self
            .values
            .get(first)
            .ok_or_else(|| Error::KeyNotFound(current_path.to_string()))?;

        for segment in segments {
            current = match (current, segment) {
                (Value::Map(m), PathSegment::Key(k)) => {
                    current_path.push_key(k.clone());
                    m.get(k)
                        .ok_or_else(|| Error::KeyNotFound(current_path.to_string()))?
                }
                (Value::List(l), PathSegment::Index(i)) => {
                    let item = l.get(*i).ok_or_else(|| Error::IndexOutOfRange {
                        path: current_path.to_string(),
                        index: *i,
                        len: l.len(),
                    })?;
                    current_path.push_index(*i);
                    item
                }
                (other, PathSegment::Key(_)) => {
                    return Err(Error::type_mismatch(&current_path, "Map", other.type_name()))
                }
                (other, PathSegment::Index(_)) => {
                    return Err(Error::type_mismatch(&current_path, "List", other.type_name()))
                }
            };
        }
        Ok(current.clone())
    }

    /// Field names
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the layer has no fields
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Materialize the whole layer
    pub fn to_value(&self) -> Value {
        Value::Map(self.values.clone())
    }
}

// ============================================================================
// DomainContext
// ============================================================================

/// Mutable working-state layer
///
/// The root is a map slot in the arena. Equality compares materialized
/// content, not slot layout.
#[derive(Debug, Clone)]
pub struct DomainContext {
    arena: Arena,
    root: Handle,
}

impl DomainContext {
    /// Create an empty layer
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(Container::Map(BTreeMap::new()));
        Self { arena, root }
    }

    /// Create from a value, which must be a map
    pub fn from_value(value: Value) -> Result<Self> {
        if !matches!(value, Value::Map(_)) {
            return Err(Error::type_mismatch("domain", "Map", value.type_name()));
        }
        let mut arena = Arena::new();
        match arena.insert_value(value) {
            Node::Container(root) => Ok(Self { arena, root }),
            Node::Scalar(v) => Err(Error::type_mismatch("domain", "Map", v.type_name())),
        }
    }

    /// Create from a JSON object
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Self::from_value(Value::from(json))
    }

    /// Handle of the root map
    pub fn root(&self) -> Handle {
        self.root
    }

    /// Borrow the container arena
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Mutably borrow the container arena
    ///
    /// This is the transaction layer's entry point. It bypasses the lock, so
    /// callers must either be a transaction or hold an unlock scope.
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Get a top-level field
    pub fn get(&self, name: &str) -> Result<Value> {
        self.get_path(&FieldPath::root().key(name))
    }

    /// Get the value at a path relative to this layer
    pub fn get_path(&self, path: &FieldPath) -> Result<Value> {
        if path.is_empty() {
            return self.to_value();
        }
        let node = self
            .arena
            .resolve(self.root, &Layer::Domain.root_path(), path)?;
        self.arena.materialize(node)
    }

    /// Check whether a top-level field exists
    pub fn contains(&self, name: &str) -> bool {
        matches!(self.arena.get(self.root), Ok(Container::Map(m)) if m.contains_key(name))
    }

    /// Top-level field names
    pub fn fields(&self) -> Vec<String> {
        match self.arena.get(self.root) {
            Ok(Container::Map(m)) => m.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Materialize the whole layer
    pub fn to_value(&self) -> Result<Value> {
        self.arena.materialize_container(self.root)
    }

    /// Directly set the value at `path`, returning the previous value
    ///
    /// Map keys are created if missing; list indexes must exist.
    ///
    /// # Errors
    ///
    /// [`Error::Locked`] in strict mode outside an unlock scope, plus the
    /// usual path errors.
    pub fn set(&mut self, lock: &LockManager, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        lock.check_mutation("set")?;
        let path = FieldPath::from_str(path)?;
        let (parent, last) = self.split_target(&path)?;
        self.check_target(parent, &last, &path)?;
        let node = self.arena.insert_value(value.into());
        let old = match (self.arena.get_mut(parent)?, &last) {
            (Container::Map(m), PathSegment::Key(k)) => m.insert(k.clone(), node),
            (Container::List(l), PathSegment::Index(i)) => {
                l.get_mut(*i).map(|slot| std::mem::replace(slot, node))
            }
            _ => None,
        };
        self.finish_detach(old)
    }

    /// Directly remove the value at `path`, returning it
    pub fn remove(&mut self, lock: &LockManager, path: &str) -> Result<Value> {
        lock.check_mutation("remove")?;
        let path = FieldPath::from_str(path)?;
        let (parent, last) = self.split_target(&path)?;
        self.check_target(parent, &last, &path)?;
        let old = match (self.arena.get_mut(parent)?, &last) {
            (Container::Map(m), PathSegment::Key(k)) => m.remove(k),
            (Container::List(l), PathSegment::Index(i)) => Some(l.remove(*i)),
            _ => None,
        }
        .ok_or_else(|| Error::KeyNotFound(domain_path(&path).to_string()))?;
        Ok(self.finish_detach(Some(old))?.unwrap_or(Value::Null))
    }

    /// Directly append to the list at `path`
    pub fn push(&mut self, lock: &LockManager, path: &str, value: impl Into<Value>) -> Result<()> {
        lock.check_mutation("push")?;
        let path = FieldPath::from_str(path)?;
        let list = self
            .arena
            .resolve_container(self.root, &Layer::Domain.root_path(), &path)?;
        if let Container::Map(_) = self.arena.get(list)? {
            return Err(Error::type_mismatch(domain_path(&path), "List", "Map"));
        }
        let node = self.arena.insert_value(value.into());
        if let Container::List(l) = self.arena.get_mut(list)? {
            l.push(node);
        }
        Ok(())
    }

    /// Validate that `last` addresses a slot of `parent`
    ///
    /// Map keys may be missing (set creates them; remove reports them later),
    /// list indexes must be in range.
    fn check_target(&self, parent: Handle, last: &PathSegment, path: &FieldPath) -> Result<()> {
        let parent_path = domain_path(&path.parent().unwrap_or_default());
        match (self.arena.get(parent)?, last) {
            (Container::Map(_), PathSegment::Key(_)) => Ok(()),
            (Container::List(l), PathSegment::Index(i)) if *i < l.len() => Ok(()),
            (Container::List(l), PathSegment::Index(i)) => Err(Error::IndexOutOfRange {
                path: parent_path.to_string(),
                index: *i,
                len: l.len(),
            }),
            (container, segment) => Err(Error::type_mismatch(
                parent_path,
                expected_for(segment),
                container.type_name(),
            )),
        }
    }

    fn split_target(&self, path: &FieldPath) -> Result<(Handle, PathSegment)> {
        let last = path
            .last_segment()
            .cloned()
            .ok_or_else(|| Error::InvalidState("cannot replace the domain root".to_string()))?;
        let parent_path = path.parent().unwrap_or_default();
        let parent = self
            .arena
            .resolve_container(self.root, &Layer::Domain.root_path(), &parent_path)?;
        Ok((parent, last))
    }

    /// Materialize a detached node and reclaim its slots
    fn finish_detach(&mut self, old: Option<Node>) -> Result<Option<Value>> {
        match old {
            None => Ok(None),
            Some(node) => {
                let value = self.arena.materialize(&node)?;
                if node.handle().is_some() {
                    self.arena.collect_garbage(self.root);
                }
                Ok(Some(value))
            }
        }
    }
}

impl Default for DomainContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for DomainContext {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_value(), other.to_value()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn domain_path(path: &FieldPath) -> FieldPath {
    let mut full = Layer::Domain.root_path();
    for segment in path.segments() {
        match segment {
            PathSegment::Key(k) => full.push_key(k.clone()),
            PathSegment::Index(i) => full.push_index(*i),
        }
    }
    full
}

fn expected_for(segment: &PathSegment) -> &'static str {
    match segment {
        PathSegment::Key(_) => "Map",
        PathSegment::Index(_) => "List",
    }
}

// ============================================================================
// SystemContext
// ============================================================================

/// The unit passed to every process: one global and one domain layer
#[derive(Debug, Clone, PartialEq)]
pub struct SystemContext {
    global: GlobalContext,
    domain: DomainContext,
}

impl SystemContext {
    /// Compose both layers
    pub fn new(global: GlobalContext, domain: DomainContext) -> Self {
        Self { global, domain }
    }

    /// Start a builder; both layers are required
    pub fn builder() -> SystemContextBuilder {
        SystemContextBuilder::default()
    }

    /// The immutable layer
    pub fn global(&self) -> &GlobalContext {
        &self.global
    }

    /// The mutable layer
    pub fn domain(&self) -> &DomainContext {
        &self.domain
    }

    /// Mutably borrow the domain layer
    pub fn domain_mut(&mut self) -> &mut DomainContext {
        &mut self.domain
    }

    /// Borrow both layers at once, the global one shared
    pub fn split_mut(&mut self) -> (&GlobalContext, &mut DomainContext) {
        (&self.global, &mut self.domain)
    }

    /// Get a value by layer-rooted path (`global.x`, `domain.items[0]`)
    pub fn get_path(&self, path: &str) -> Result<Value> {
        let path = FieldPath::from_str(path)?;
        let layer = path
            .first_key()
            .and_then(Layer::from_name)
            .ok_or_else(|| Error::KeyNotFound(path.to_string()))?;
        match layer {
            Layer::Global => self.global.get_path(&path.tail()),
            Layer::Domain => self.domain.get_path(&path.tail()),
        }
    }

    /// Decompose into both layers
    pub fn into_parts(self) -> (GlobalContext, DomainContext) {
        (self.global, self.domain)
    }
}

/// Builder for [`SystemContext`]
#[derive(Debug, Default)]
pub struct SystemContextBuilder {
    global: Option<GlobalContext>,
    domain: Option<DomainContext>,
}

impl SystemContextBuilder {
    /// Set the global layer
    pub fn global(mut self, global: GlobalContext) -> Self {
        self.global = Some(global);
        self
    }

    /// Set the domain layer
    pub fn domain(mut self, domain: DomainContext) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Build the context
    ///
    /// # Errors
    ///
    /// [`Error::MissingLayer`] if either layer was not provided.
    pub fn build(self) -> Result<SystemContext> {
        let global = self.global.ok_or(Error::MissingLayer("global"))?;
        let domain = self.domain.ok_or(Error::MissingLayer("domain"))?;
        Ok(SystemContext::new(global, domain))
    }
}
