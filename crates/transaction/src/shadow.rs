//! Shadow container proxies
//!
//! [`ShadowMap`] and [`ShadowList`] are views over a shadow slot owned by a
//! [`Transaction`]. They hold no data of their own: reads go to the slot,
//! writes mutate the slot and log exactly one [`DeltaEntry`] each.
//!
//! Traversing into a nested container (`map`, `list`, `map_at`, `list_at`)
//! shadows the child on first access, rewrites this slot's child handle to
//! the shadow, and returns a proxy whose path extends this one.

use crate::delta::{DeltaEntry, DeltaOp};
use crate::transaction::Transaction;
use pop_core::{
    validate_key, Container, Error, FieldPath, Handle, Node, PathSegment, Result, Value,
};

// ============================================================================
// Traversal helpers
// ============================================================================

/// Shadow the container child at `segment` of `parent` and relink it
pub(crate) fn descend(
    tx: &mut Transaction<'_>,
    parent: Handle,
    parent_path: &FieldPath,
    segment: PathSegment,
    expected: &'static str,
) -> Result<(Handle, FieldPath)> {
    let child_path = extend(parent_path, &segment);
    let child = match child_node(tx, parent, &segment, parent_path)? {
        Node::Container(h) => h,
        Node::Scalar(v) => return Err(Error::type_mismatch(&child_path, expected, v.type_name())),
    };

    let actual = tx.container(child)?.type_name();
    if actual != expected {
        return Err(Error::type_mismatch(&child_path, expected, actual));
    }

    let shadow = tx.get_shadow(child)?;
    if shadow != child {
        match (tx.container_mut(parent)?, &segment) {
            (Container::Map(m), PathSegment::Key(k)) => {
                if let Some(node) = m.get_mut(k) {
                    *node = Node::Container(shadow);
                }
            }
            (Container::List(l), PathSegment::Index(i)) => {
                if let Some(node) = l.get_mut(*i) {
                    *node = Node::Container(shadow);
                }
            }
            _ => {}
        }
    }
    Ok((shadow, child_path))
}

fn child_node(
    tx: &Transaction<'_>,
    parent: Handle,
    segment: &PathSegment,
    parent_path: &FieldPath,
) -> Result<Node> {
    match (tx.container(parent)?, segment) {
        (Container::Map(m), PathSegment::Key(k)) => m
            .get(k)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(parent_path.clone().key(k.clone()).to_string())),
        (Container::List(l), PathSegment::Index(i)) => {
            l.get(*i).cloned().ok_or_else(|| Error::IndexOutOfRange {
                path: parent_path.to_string(),
                index: *i,
                len: l.len(),
            })
        }
        (container, PathSegment::Key(_)) => {
            Err(Error::type_mismatch(parent_path, "Map", container.type_name()))
        }
        (container, PathSegment::Index(_)) => {
            Err(Error::type_mismatch(parent_path, "List", container.type_name()))
        }
    }
}

fn extend(path: &FieldPath, segment: &PathSegment) -> FieldPath {
    match segment {
        PathSegment::Key(k) => path.clone().key(k.clone()),
        PathSegment::Index(i) => path.clone().index(*i),
    }
}

// ============================================================================
// ShadowMap
// ============================================================================

/// Proxy over a shadowed mapping
#[derive(Debug)]
pub struct ShadowMap<'a, 'c> {
    tx: &'a mut Transaction<'c>,
    handle: Handle,
    path: FieldPath,
}

impl<'a, 'c> ShadowMap<'a, 'c> {
    pub(crate) fn new(tx: &'a mut Transaction<'c>, handle: Handle, path: FieldPath) -> Self {
        Self { tx, handle, path }
    }

    /// Slot this proxy views
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Layer-rooted path of this map
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    fn entries(&self) -> Result<&std::collections::BTreeMap<String, Node>> {
        match self.tx.container(self.handle)? {
            Container::Map(m) => Ok(m),
            Container::List(_) => Err(Error::type_mismatch(&self.path, "Map", "List")),
        }
    }

    fn entries_mut(&mut self) -> Result<&mut std::collections::BTreeMap<String, Node>> {
        match self.tx.container_mut(self.handle)? {
            Container::Map(m) => Ok(m),
            Container::List(_) => Err(Error::type_mismatch(&self.path, "Map", "List")),
        }
    }

    /// Value under `key`, materialized
    pub fn get(&self, key: &str) -> Result<Value> {
        let node = self
            .entries()?
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(self.path.clone().key(key).to_string()))?;
        self.tx.materialize(node)
    }

    /// Check whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries().map(|m| m.contains_key(key)).unwrap_or(false)
    }

    /// Number of entries
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// True if the map has no entries
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// Keys, in order
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.keys().cloned().collect())
    }

    /// Values, materialized, in key order
    pub fn values(&self) -> Result<Vec<Value>> {
        self.entries()?
            .values()
            .map(|n| self.tx.materialize(n))
            .collect()
    }

    /// The whole map, materialized
    pub fn to_value(&self) -> Result<Value> {
        self.tx.materialize(&Node::Container(self.handle))
    }

    /// Proxy over the nested map under `key`
    pub fn map(&mut self, key: &str) -> Result<ShadowMap<'_, 'c>> {
        let (handle, path) = descend(self.tx, self.handle, &self.path, key_segment(key)?, "Map")?;
        Ok(ShadowMap::new(self.tx, handle, path))
    }

    /// Proxy over the nested list under `key`
    pub fn list(&mut self, key: &str) -> Result<ShadowList<'_, 'c>> {
        let (handle, path) = descend(self.tx, self.handle, &self.path, key_segment(key)?, "List")?;
        Ok(ShadowList::new(self.tx, handle, path))
    }

    /// Assign `key`, returning the previous value
    ///
    /// `key` must be addressable by a path (see [`validate_key`]).
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        validate_key(key)?;
        self.tx.ensure_active()?;
        let value = value.into();
        let node = self.tx.alloc_value(value.clone());
        let old = self.entries_mut()?.insert(key.to_string(), node);
        let old_value = match &old {
            Some(node) => {
                self.tx.note_detached(node);
                Some(self.tx.materialize(node)?)
            }
            None => None,
        };
        self.tx.log(DeltaEntry::new(
            self.path.clone().key(key),
            DeltaOp::Set,
            Some(value),
            old_value.clone(),
        ))?;
        Ok(old_value)
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &str) -> Result<Value> {
        validate_key(key)?;
        let path = self.path.clone().key(key);
        let old = self
            .entries_mut()?
            .remove(key)
            .ok_or_else(|| Error::KeyNotFound(path.to_string()))?;
        self.tx.note_detached(&old);
        let old_value = self.tx.materialize(&old)?;
        self.tx
            .log(DeltaEntry::new(path, DeltaOp::Remove, None, Some(old_value.clone())))?;
        Ok(old_value)
    }
}

fn key_segment(key: &str) -> Result<PathSegment> {
    validate_key(key)?;
    Ok(PathSegment::Key(key.to_string()))
}

// ============================================================================
// ShadowList
// ============================================================================

/// Proxy over a shadowed sequence
#[derive(Debug)]
pub struct ShadowList<'a, 'c> {
    tx: &'a mut Transaction<'c>,
    handle: Handle,
    path: FieldPath,
}

impl<'a, 'c> ShadowList<'a, 'c> {
    pub(crate) fn new(tx: &'a mut Transaction<'c>, handle: Handle, path: FieldPath) -> Self {
        Self { tx, handle, path }
    }

    /// Slot this proxy views
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Layer-rooted path of this list
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    fn items(&self) -> Result<&Vec<Node>> {
        match self.tx.container(self.handle)? {
            Container::List(l) => Ok(l),
            Container::Map(_) => Err(Error::type_mismatch(&self.path, "List", "Map")),
        }
    }

    fn items_mut(&mut self) -> Result<&mut Vec<Node>> {
        match self.tx.container_mut(self.handle)? {
            Container::List(l) => Ok(l),
            Container::Map(_) => Err(Error::type_mismatch(&self.path, "List", "Map")),
        }
    }

    fn out_of_range(&self, index: usize, len: usize) -> Error {
        Error::IndexOutOfRange {
            path: self.path.to_string(),
            index,
            len,
        }
    }

    /// Element at `index`, materialized
    pub fn get(&self, index: usize) -> Result<Value> {
        let items = self.items()?;
        let node = items
            .get(index)
            .ok_or_else(|| self.out_of_range(index, items.len()))?;
        self.tx.materialize(node)
    }

    /// Number of elements
    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    /// True if the list has no elements
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.items()?.is_empty())
    }

    /// Elements, materialized, in order
    pub fn values(&self) -> Result<Vec<Value>> {
        self.items()?.iter().map(|n| self.tx.materialize(n)).collect()
    }

    /// The whole list, materialized
    pub fn to_value(&self) -> Result<Value> {
        self.tx.materialize(&Node::Container(self.handle))
    }

    /// Proxy over the nested map at `index`
    pub fn map_at(&mut self, index: usize) -> Result<ShadowMap<'_, 'c>> {
        let (handle, path) =
            descend(self.tx, self.handle, &self.path, PathSegment::Index(index), "Map")?;
        Ok(ShadowMap::new(self.tx, handle, path))
    }

    /// Proxy over the nested list at `index`
    pub fn list_at(&mut self, index: usize) -> Result<ShadowList<'_, 'c>> {
        let (handle, path) =
            descend(self.tx, self.handle, &self.path, PathSegment::Index(index), "List")?;
        Ok(ShadowList::new(self.tx, handle, path))
    }

    /// Replace the element at `index`, returning the previous value
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<Value> {
        let len = self.len()?;
        if index >= len {
            return Err(self.out_of_range(index, len));
        }
        let value = value.into();
        let node = self.tx.alloc_value(value.clone());
        let old = std::mem::replace(&mut self.items_mut()?[index], node);
        self.tx.note_detached(&old);
        let old_value = self.tx.materialize(&old)?;
        self.tx.log(DeltaEntry::new(
            self.path.clone().index(index),
            DeltaOp::Set,
            Some(value),
            Some(old_value.clone()),
        ))?;
        Ok(old_value)
    }

    /// Delete the element at `index`, returning it
    pub fn remove(&mut self, index: usize) -> Result<Value> {
        let old = self.take(index)?;
        self.tx.log(DeltaEntry::new(
            self.path.clone().index(index),
            DeltaOp::Remove,
            None,
            Some(old.clone()),
        ))?;
        Ok(old)
    }

    /// Append one element
    pub fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        self.tx.ensure_active()?;
        let value = value.into();
        let node = self.tx.alloc_value(value.clone());
        self.items_mut()?.push(node);
        self.tx
            .log(DeltaEntry::new(self.path.clone(), DeltaOp::Append, Some(value), None))
    }

    /// Append several elements, logged as one entry
    pub fn extend<I, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.tx.ensure_active()?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let nodes: Vec<Node> = values
            .iter()
            .map(|v| self.tx.alloc_value(v.clone()))
            .collect();
        self.items_mut()?.extend(nodes);
        self.tx.log(DeltaEntry::new(
            self.path.clone(),
            DeltaOp::Extend,
            Some(Value::List(values)),
            None,
        ))
    }

    /// Insert an element before `index`; `index == len` appends
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let len = self.len()?;
        if index > len {
            return Err(self.out_of_range(index, len));
        }
        self.tx.ensure_active()?;
        let value = value.into();
        let node = self.tx.alloc_value(value.clone());
        self.items_mut()?.insert(index, node);
        self.tx.log(DeltaEntry::new(
            self.path.clone().index(index),
            DeltaOp::Insert,
            Some(value),
            None,
        ))
    }

    /// Remove and return the element at `index`, or the last one
    pub fn pop(&mut self, index: Option<usize>) -> Result<Value> {
        let len = self.len()?;
        let index = match index {
            Some(i) => i,
            None if len > 0 => len - 1,
            None => return Err(self.out_of_range(0, 0)),
        };
        let old = self.take(index)?;
        self.tx.log(DeltaEntry::new(
            self.path.clone().index(index),
            DeltaOp::Pop,
            None,
            Some(old.clone()),
        ))?;
        Ok(old)
    }

    fn take(&mut self, index: usize) -> Result<Value> {
        let len = self.len()?;
        if index >= len {
            return Err(self.out_of_range(index, len));
        }
        let old = self.items_mut()?.remove(index);
        self.tx.note_detached(&old);
        self.tx.materialize(&old)
    }
}
