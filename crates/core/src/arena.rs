//! Container arena for the domain layer
//!
//! Nested containers of the mutable layer are not stored inline. Each list or
//! map lives in its own slot of an [`Arena`] and is referenced from its parent
//! by an integer [`Handle`]. This gives every container a stable identity that
//! does not depend on where it sits in memory, which the transaction layer
//! relies on:
//!
//! - **Shadowing** clones one slot into a fresh slot. The clone is shallow:
//!   children remain handles to the original slots until they are traversed.
//! - **Commit** copies a shadow slot back over its original, so every holder of
//!   the original handle observes the new content.
//! - **Rollback** restores the allocation state captured by
//!   [`Arena::checkpoint`]; original slots are never written during a
//!   transaction, so nothing else needs undoing.
//!
//! Slots freed by garbage collection are recycled through a free list.

use crate::error::{Error, Result};
use crate::path::{FieldPath, PathSegment};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Index of a container slot in an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Slot index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A child stored inside a container
///
/// `Scalar` never holds a `List` or `Map`; nested containers are always
/// `Container` handles.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Non-container value
    Scalar(Value),
    /// Handle to a nested container
    Container(Handle),
}

impl Node {
    /// Handle of the nested container, if this node is one
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Node::Container(h) => Some(*h),
            Node::Scalar(_) => None,
        }
    }
}

/// Contents of one arena slot
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    /// Sequence container
    List(Vec<Node>),
    /// Mapping container
    Map(BTreeMap<String, Node>),
}

impl Container {
    /// Type name, matching [`Value::type_name`]
    pub fn type_name(&self) -> &'static str {
        match self {
            Container::List(_) => "List",
            Container::Map(_) => "Map",
        }
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        match self {
            Container::List(l) => l.len(),
            Container::Map(m) => m.len(),
        }
    }

    /// True if the container has no children
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over direct child nodes
    pub fn nodes(&self) -> Box<dyn Iterator<Item = &Node> + '_> {
        match self {
            Container::List(l) => Box::new(l.iter()),
            Container::Map(m) => Box::new(m.values()),
        }
    }

    /// Iterate mutably over direct child nodes
    pub fn nodes_mut(&mut self) -> Box<dyn Iterator<Item = &mut Node> + '_> {
        match self {
            Container::List(l) => Box::new(l.iter_mut()),
            Container::Map(m) => Box::new(m.values_mut()),
        }
    }
}

/// Allocation state captured at transaction start
#[derive(Debug, Clone)]
pub struct ArenaCheckpoint {
    len: usize,
    free: Vec<Handle>,
}

/// Slot storage for nested containers
#[derive(Debug, Clone, Default)]
pub struct Arena {
    slots: Vec<Option<Container>>,
    free: Vec<Handle>,
}

impl Arena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a container and return its handle
    pub fn alloc(&mut self, container: Container) -> Handle {
        if let Some(handle) = self.free.pop() {
            self.slots[handle.index()] = Some(container);
            handle
        } else {
            self.slots.push(Some(container));
            Handle((self.slots.len() - 1) as u32)
        }
    }

    /// Release a single slot
    pub fn free(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            if slot.take().is_some() {
                self.free.push(handle);
            }
        }
    }

    /// Borrow the container in a slot
    pub fn get(&self, handle: Handle) -> Result<&Container> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidState(format!("dangling container handle {}", handle)))
    }

    /// Mutably borrow the container in a slot
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Container> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidState(format!("dangling container handle {}", handle)))
    }

    /// Replace the contents of an occupied slot
    pub fn replace(&mut self, handle: Handle, container: Container) -> Result<Container> {
        let slot = self.get_mut(handle)?;
        Ok(std::mem::replace(slot, container))
    }

    /// Number of occupied slots
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Convert an owned value into a node, allocating slots for every
    /// nested container
    pub fn insert_value(&mut self, value: Value) -> Node {
        match value {
            Value::List(items) => {
                let nodes = items.into_iter().map(|v| self.insert_value(v)).collect();
                Node::Container(self.alloc(Container::List(nodes)))
            }
            Value::Map(entries) => {
                let nodes = entries
                    .into_iter()
                    .map(|(k, v)| (k, self.insert_value(v)))
                    .collect();
                Node::Container(self.alloc(Container::Map(nodes)))
            }
            scalar => Node::Scalar(scalar),
        }
    }

    /// Build an owned value from a node
    pub fn materialize(&self, node: &Node) -> Result<Value> {
        match node {
            Node::Scalar(v) => Ok(v.clone()),
            Node::Container(h) => self.materialize_container(*h),
        }
    }

    /// Build an owned value from a container slot
    pub fn materialize_container(&self, handle: Handle) -> Result<Value> {
        match self.get(handle)? {
            Container::List(nodes) => Ok(Value::List(
                nodes
                    .iter()
                    .map(|n| self.materialize(n))
                    .collect::<Result<_>>()?,
            )),
            Container::Map(nodes) => Ok(Value::Map(
                nodes
                    .iter()
                    .map(|(k, n)| Ok((k.clone(), self.materialize(n)?)))
                    .collect::<Result<_>>()?,
            )),
        }
    }

    /// Look up a direct child of a container
    ///
    /// `path` is the container's own path and is only used for error messages.
    pub fn child(&self, handle: Handle, segment: &PathSegment, path: &FieldPath) -> Result<&Node> {
        match (self.get(handle)?, segment) {
            (Container::Map(m), PathSegment::Key(k)) => m
                .get(k)
                .ok_or_else(|| Error::KeyNotFound(path.clone().key(k.clone()).to_string())),
            (Container::List(l), PathSegment::Index(i)) => {
                l.get(*i).ok_or_else(|| Error::IndexOutOfRange {
                    path: path.to_string(),
                    index: *i,
                    len: l.len(),
                })
            }
            (Container::Map(_), PathSegment::Index(_)) => Err(Error::type_mismatch(path, "List", "Map")),
            (Container::List(_), PathSegment::Key(_)) => Err(Error::type_mismatch(path, "Map", "List")),
        }
    }

    /// Resolve a path relative to `root`
    ///
    /// `base` is the path of `root` and prefixes paths in error messages.
    pub fn resolve(&self, root: Handle, base: &FieldPath, path: &FieldPath) -> Result<&Node> {
        let mut current_path = base.clone();
        let mut handle = root;
        let mut segments = path.segments().iter().peekable();
        while let Some(segment) = segments.next() {
            let node = self.child(handle, segment, &current_path)?;
            push_segment(&mut current_path, segment);
            if segments.peek().is_none() {
                return Ok(node);
            }
            match node {
                Node::Container(h) => handle = *h,
                Node::Scalar(v) => {
                    return Err(Error::type_mismatch(&current_path, "container", v.type_name()))
                }
            }
        }
        Err(Error::InvalidState("cannot resolve the root path to a node".to_string()))
    }

    /// Resolve a path that must name a container, returning its handle
    pub fn resolve_container(&self, root: Handle, base: &FieldPath, path: &FieldPath) -> Result<Handle> {
        if path.is_empty() {
            return Ok(root);
        }
        match self.resolve(root, base, path)? {
            Node::Container(h) => Ok(*h),
            Node::Scalar(v) => Err(Error::type_mismatch(
                join(base, path),
                "container",
                v.type_name(),
            )),
        }
    }

    /// Capture the allocation state
    pub fn checkpoint(&self) -> ArenaCheckpoint {
        ArenaCheckpoint {
            len: self.slots.len(),
            free: self.free.clone(),
        }
    }

    /// Release every slot allocated since `checkpoint`
    ///
    /// Only valid if no slot that was live at the checkpoint has been written
    /// or freed since.
    pub fn restore(&mut self, checkpoint: ArenaCheckpoint) {
        for handle in &checkpoint.free {
            if let Some(slot) = self.slots.get_mut(handle.index()) {
                *slot = None;
            }
        }
        self.slots.truncate(checkpoint.len);
        self.free = checkpoint.free;
    }

    /// Free every slot not reachable from `root`, returning how many were freed
    pub fn collect_garbage(&mut self, root: Handle) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let idx = handle.index();
            if idx >= marked.len() || marked[idx] {
                continue;
            }
            marked[idx] = true;
            if let Some(Some(container)) = self.slots.get(idx) {
                stack.extend(container.nodes().filter_map(Node::handle));
            }
        }

        let mut freed = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !marked[idx] {
                *slot = None;
                self.free.push(Handle(idx as u32));
                freed += 1;
            }
        }
        freed
    }
}

fn push_segment(path: &mut FieldPath, segment: &PathSegment) {
    match segment {
        PathSegment::Key(k) => path.push_key(k.clone()),
        PathSegment::Index(i) => path.push_index(*i),
    }
}

fn join(base: &FieldPath, path: &FieldPath) -> FieldPath {
    let mut joined = base.clone();
    for segment in path.segments() {
        push_segment(&mut joined, segment);
    }
    joined
}
