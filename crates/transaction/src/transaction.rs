//! Transaction over the domain layer
//!
//! A [`Transaction`] owns the mutable borrow of a [`DomainContext`] for the
//! duration of one process invocation. Mutations never touch original
//! container slots; instead the first traversal into a container clones it
//! into a shadow slot ("lazy deepening") and rewrites the parent shadow's
//! child handle to point at the clone.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──commit()──▶ Committed
//!    │
//!    └──rollback()──▶ RolledBack
//! ```
//!
//! - **Commit** writes every shadow back over its original slot, mapping child
//!   handles from shadows to originals so that outer identity is preserved,
//!   then frees the shadow slots and reclaims detached containers.
//! - **Rollback** restores the arena's allocation state from the checkpoint
//!   taken at begin. Originals were never written, so this is exact.
//!
//! Dropping an active transaction rolls it back.

use crate::delta::{DeltaEntry, PendingOperations};
use crate::shadow::{descend, ShadowList, ShadowMap};
use pop_core::{
    ArenaCheckpoint, Container, DomainContext, Error, FieldPath, Handle, Layer, Node, PathSegment,
    Result, Value,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, trace, warn};

/// Transaction status
///
/// State transitions:
/// - `Active` → `Committed` (successful commit)
/// - `Active` → `RolledBack` (rollback, explicit or on drop)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting mutations
    Active,
    /// Shadows written back; terminal
    Committed,
    /// Shadows discarded; terminal
    RolledBack,
}

/// Copy-on-write transaction over one domain layer
pub struct Transaction<'c> {
    txn_id: u64,
    domain: &'c mut DomainContext,
    status: TransactionStatus,
    entries: Vec<DeltaEntry>,
    /// original -> shadow
    shadows: FxHashMap<Handle, Handle>,
    /// shadow -> original
    originals: FxHashMap<Handle, Handle>,
    /// Containers allocated by this transaction for newly written values
    fresh: FxHashSet<Handle>,
    checkpoint: Option<ArenaCheckpoint>,
    /// Set when a mutation unlinked a container node
    detached: bool,
}

impl<'c> Transaction<'c> {
    /// Begin a transaction over `domain`
    pub fn begin(txn_id: u64, domain: &'c mut DomainContext) -> Self {
        let checkpoint = domain.arena().checkpoint();
        debug!(target: "pop::txn", txn_id, "Transaction started");
        Self {
            txn_id,
            domain,
            status: TransactionStatus::Active,
            entries: Vec::new(),
            shadows: FxHashMap::default(),
            originals: FxHashMap::default(),
            fresh: FxHashSet::default(),
            checkpoint: Some(checkpoint),
            detached: false,
        }
    }

    /// Transaction id
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Check if transaction can accept operations
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the transaction was committed or
    /// rolled back.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "Transaction {} is not active: {:?}",
                self.txn_id, self.status
            )))
        }
    }

    // === Delta Log ===

    /// Append an entry to the log
    ///
    /// The path is not validated; shadow proxies are responsible for logging
    /// the location they mutated.
    pub fn log(&mut self, entry: DeltaEntry) -> Result<()> {
        self.ensure_active()?;
        trace!(target: "pop::txn", txn_id = self.txn_id, op = %entry.op, path = %entry.path, "Delta logged");
        self.entries.push(entry);
        Ok(())
    }

    /// Logged entries, in order
    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    /// True if nothing has been logged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summary of logged operations by kind
    pub fn pending(&self) -> PendingOperations {
        PendingOperations::from_entries(&self.entries)
    }

    // === Shadowing ===

    /// Number of shadow slots created so far
    pub fn shadow_count(&self) -> usize {
        self.shadows.len()
    }

    /// Return the shadow of `handle`, creating it on first request
    ///
    /// The clone is shallow: child containers of the shadow still point at
    /// their original slots until they are traversed. A handle that is
    /// already a shadow, or that this transaction allocated, is returned
    /// unchanged.
    pub fn get_shadow(&mut self, handle: Handle) -> Result<Handle> {
        self.ensure_active()?;
        if let Some(shadow) = self.shadows.get(&handle) {
            return Ok(*shadow);
        }
        if self.originals.contains_key(&handle) || self.fresh.contains(&handle) {
            return Ok(handle);
        }
        let copy = self.domain.arena().get(handle)?.clone();
        let shadow = self.domain.arena_mut().alloc(copy);
        self.shadows.insert(handle, shadow);
        self.originals.insert(shadow, handle);
        trace!(target: "pop::txn", txn_id = self.txn_id, original = %handle, shadow = %shadow, "Shadow created");
        Ok(shadow)
    }

    /// Handle to read through for `handle`: its shadow if one exists
    pub fn current(&self, handle: Handle) -> Handle {
        self.shadows.get(&handle).copied().unwrap_or(handle)
    }

    /// Proxy over the shadow of the domain root
    pub fn root_map(&mut self) -> Result<ShadowMap<'_, 'c>> {
        let root = self.domain.root();
        let shadow = self.get_shadow(root)?;
        Ok(ShadowMap::new(self, shadow, Layer::Domain.root_path()))
    }

    /// Proxy over the map at a domain-relative path
    ///
    /// Every container along the path is shadowed.
    pub fn map_at(&mut self, path: &FieldPath) -> Result<ShadowMap<'_, 'c>> {
        let (handle, full) = self.shadow_path(path, "Map")?;
        Ok(ShadowMap::new(self, handle, full))
    }

    /// Proxy over the list at a domain-relative path
    pub fn list_at(&mut self, path: &FieldPath) -> Result<ShadowList<'_, 'c>> {
        let (handle, full) = self.shadow_path(path, "List")?;
        Ok(ShadowList::new(self, handle, full))
    }

    fn shadow_path(&mut self, path: &FieldPath, expected: &'static str) -> Result<(Handle, FieldPath)> {
        let root = self.domain.root();
        let mut handle = self.get_shadow(root)?;
        let mut full = Layer::Domain.root_path();
        if path.is_empty() && expected != "Map" {
            return Err(Error::type_mismatch(full, expected, "Map"));
        }
        let segments = path.segments();
        for (i, segment) in segments.iter().enumerate() {
            let wanted = match segments.get(i + 1) {
                Some(PathSegment::Key(_)) => "Map",
                Some(PathSegment::Index(_)) => "List",
                None => expected,
            };
            let (next, next_path) = descend(self, handle, &full, segment.clone(), wanted)?;
            handle = next;
            full = next_path;
        }
        Ok((handle, full))
    }

    /// Read the value at a domain-relative path as this transaction sees it
    ///
    /// Reads never create shadows.
    pub fn read_path(&self, path: &FieldPath) -> Result<Value> {
        let root = self.current(self.domain.root());
        if path.is_empty() {
            return self.domain.arena().materialize_container(root);
        }
        let arena = self.domain.arena();
        let node = arena.resolve(root, &Layer::Domain.root_path(), path)?;
        arena.materialize(node)
    }

    /// Check whether a top-level domain field exists in the current view
    pub fn contains_field(&self, name: &str) -> bool {
        let root = self.current(self.domain.root());
        matches!(self.domain.arena().get(root), Ok(Container::Map(m)) if m.contains_key(name))
    }

    // === Arena access for proxies ===

    pub(crate) fn container(&self, handle: Handle) -> Result<&Container> {
        self.domain.arena().get(handle)
    }

    /// Mutable access to a slot this transaction owns
    pub(crate) fn container_mut(&mut self, handle: Handle) -> Result<&mut Container> {
        self.ensure_active()?;
        if !self.owns(handle) {
            return Err(Error::InvalidState(format!(
                "container {} is not a shadow of transaction {}",
                handle, self.txn_id
            )));
        }
        self.domain.arena_mut().get_mut(handle)
    }

    pub(crate) fn materialize(&self, node: &Node) -> Result<Value> {
        self.domain.arena().materialize(node)
    }

    /// Store a value written by a mutation, tracking any containers it allocates
    pub(crate) fn alloc_value(&mut self, value: Value) -> Node {
        let node = self.domain.arena_mut().insert_value(value);
        let mut stack: Vec<Handle> = node.handle().into_iter().collect();
        while let Some(handle) = stack.pop() {
            self.fresh.insert(handle);
            if let Ok(container) = self.domain.arena().get(handle) {
                stack.extend(container.nodes().filter_map(Node::handle));
            }
        }
        node
    }

    /// Record that `node` was unlinked from its parent
    pub(crate) fn note_detached(&mut self, node: &Node) {
        if node.handle().is_some() {
            self.detached = true;
        }
    }

    fn owns(&self, handle: Handle) -> bool {
        self.originals.contains_key(&handle) || self.fresh.contains(&handle)
    }

    // === Resolution ===

    /// Commit the transaction
    ///
    /// Writes each shadow back over its original and returns the delta log.
    /// After a successful commit the domain layer contains no shadow slots.
    ///
    /// # Errors
    /// [`Error::InvalidState`] if the transaction is no longer active.
    pub fn commit(&mut self) -> Result<Vec<DeltaEntry>> {
        self.ensure_active()?;

        let mut write_back = Vec::with_capacity(self.shadows.len());
        for (&original, &shadow) in &self.shadows {
            let mut content = self.domain.arena().get(shadow)?.clone();
            for node in content.nodes_mut() {
                if let Node::Container(child) = node {
                    if let Some(orig) = self.originals.get(child) {
                        *child = *orig;
                    }
                }
            }
            write_back.push((original, shadow, content));
        }

        let arena = self.domain.arena_mut();
        for (original, shadow, content) in write_back {
            arena.replace(original, content)?;
            arena.free(shadow);
        }
        let reclaimed = if self.detached {
            let root = self.domain.root();
            self.domain.arena_mut().collect_garbage(root)
        } else {
            0
        };

        self.status = TransactionStatus::Committed;
        self.checkpoint = None;
        let entries = std::mem::take(&mut self.entries);
        info!(
            target: "pop::txn",
            txn_id = self.txn_id,
            entries = entries.len(),
            shadows = self.shadows.len(),
            reclaimed,
            "Transaction committed"
        );
        self.shadows.clear();
        self.originals.clear();
        self.fresh.clear();
        Ok(entries)
    }

    /// Roll back the transaction
    ///
    /// Discards every shadow and every slot allocated since begin. Safe with
    /// zero mutations.
    ///
    /// # Errors
    /// [`Error::InvalidState`] if the transaction is no longer active.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.discard();
        Ok(())
    }

    fn discard(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.domain.arena_mut().restore(checkpoint);
        }
        warn!(
            target: "pop::txn",
            txn_id = self.txn_id,
            discarded = self.entries.len(),
            "Transaction rolled back"
        );
        self.entries.clear();
        self.shadows.clear();
        self.originals.clear();
        self.fresh.clear();
        self.status = TransactionStatus::RolledBack;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            self.discard();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("txn_id", &self.txn_id)
            .field("status", &self.status)
            .field("entries", &self.entries.len())
            .field("shadows", &self.shadows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaOp;
    use serde_json::json;

    fn domain() -> DomainContext {
        DomainContext::from_json(json!({
            "items": [1, 2, 3],
            "total": 0,
            "user": {"name": "Ana", "tags": ["a"]}
        }))
        .unwrap()
    }

    #[test]
    fn test_begin_is_active_and_empty() {
        let mut d = domain();
        let tx = Transaction::begin(1, &mut d);
        assert_eq!(tx.txn_id(), 1);
        assert!(tx.is_active());
        assert!(tx.is_empty());
        assert_eq!(tx.shadow_count(), 0);
    }

    #[test]
    fn test_get_shadow_is_idempotent() {
        let mut d = domain();
        let root = d.root();
        let mut tx = Transaction::begin(1, &mut d);
        let first = tx.get_shadow(root).unwrap();
        let second = tx.get_shadow(root).unwrap();
        assert_ne!(first, root);
        assert_eq!(first, second);
        // shadow of a shadow is itself
        assert_eq!(tx.get_shadow(first).unwrap(), first);
        assert_eq!(tx.shadow_count(), 1);
        assert_eq!(tx.current(root), first);
    }

    #[test]
    fn test_commit_preserves_root_identity() {
        let mut d = domain();
        let root = d.root();
        {
            let mut tx = Transaction::begin(1, &mut d);
            tx.root_map().unwrap().set("total", 10).unwrap();
            let entries = tx.commit().unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].op, DeltaOp::Set);
            assert_eq!(entries[0].path.to_string(), "domain.total");
            assert_eq!(tx.status(), TransactionStatus::Committed);
        }
        assert_eq!(d.root(), root);
        assert_eq!(d.get("total").unwrap(), Value::Int(10));
        // root map, items, user, user.tags
        assert_eq!(d.arena().live_count(), 4);
    }

    #[test]
    fn test_rollback_restores_exactly() {
        let mut d = domain();
        let before = d.clone();
        let live_before = d.arena().live_count();
        {
            let mut tx = Transaction::begin(1, &mut d);
            let mut root = tx.root_map().unwrap();
            root.list("items").unwrap().push(4).unwrap();
            root.set("total", json!({"nested": [1, 2]})).unwrap();
            root.map("user").unwrap().list("tags").unwrap().push("b").unwrap();
            tx.rollback().unwrap();
            assert_eq!(tx.status(), TransactionStatus::RolledBack);
        }
        assert_eq!(d, before);
        assert_eq!(d.arena().live_count(), live_before);
    }

    #[test]
    fn test_rollback_with_no_mutations() {
        let mut d = domain();
        let before = d.clone();
        let mut tx = Transaction::begin(1, &mut d);
        assert!(tx.rollback().is_ok());
        drop(tx);
        assert_eq!(d, before);
    }

    #[test]
    fn test_drop_rolls_back_active_transaction() {
        let mut d = domain();
        let before = d.clone();
        {
            let mut tx = Transaction::begin(1, &mut d);
            tx.root_map().unwrap().set("total", 99).unwrap();
        }
        assert_eq!(d, before);
    }

    #[test]
    fn test_operations_after_resolution_fail() {
        let mut d = domain();
        let root = d.root();
        let mut tx = Transaction::begin(1, &mut d);
        tx.commit().unwrap();

        assert!(matches!(tx.commit(), Err(Error::InvalidState(_))));
        assert!(matches!(tx.rollback(), Err(Error::InvalidState(_))));
        assert!(matches!(tx.get_shadow(root), Err(Error::InvalidState(_))));
        let entry = DeltaEntry::new(FieldPath::root(), DeltaOp::Set, None, None);
        assert!(matches!(tx.log(entry), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_read_path_sees_own_writes_without_shadowing() {
        let mut d = domain();
        let mut tx = Transaction::begin(1, &mut d);
        let path: FieldPath = "items".parse().unwrap();
        assert_eq!(tx.read_path(&path).unwrap(), Value::from(json!([1, 2, 3])));
        assert_eq!(tx.shadow_count(), 0);

        tx.root_map().unwrap().list("items").unwrap().push(4).unwrap();
        assert_eq!(tx.read_path(&path).unwrap(), Value::from(json!([1, 2, 3, 4])));
        assert!(tx.contains_field("items"));
        assert!(!tx.contains_field("missing"));
    }

    #[test]
    fn test_proxies_by_path() {
        let mut d = domain();
        let mut tx = Transaction::begin(1, &mut d);
        let tags: FieldPath = "user.tags".parse().unwrap();
        tx.list_at(&tags).unwrap().push("b").unwrap();
        assert_eq!(tx.list_at(&tags).unwrap().path().to_string(), "domain.user.tags");
        // root, user, user.tags
        assert_eq!(tx.shadow_count(), 3);

        let user: FieldPath = "user".parse().unwrap();
        assert_eq!(tx.map_at(&user).unwrap().get("name").unwrap(), Value::from("Ana"));
        assert!(tx.map_at(&FieldPath::root()).is_ok());
        assert!(matches!(tx.list_at(&user), Err(Error::TypeMismatch { .. })));
        assert!(matches!(
            tx.list_at(&"user.name.x".parse().unwrap()),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_commit_reclaims_detached_containers() {
        let mut d = domain();
        {
            let mut tx = Transaction::begin(1, &mut d);
            let mut root = tx.root_map().unwrap();
            // shadow user.tags, then detach the whole user subtree
            root.map("user").unwrap().list("tags").unwrap().push("b").unwrap();
            root.remove("user").unwrap();
            tx.commit().unwrap();
        }
        assert!(!d.contains("user"));
        // root map and items only
        assert_eq!(d.arena().live_count(), 2);
    }

    #[test]
    fn test_pending_counts_logged_operations() {
        let mut d = domain();
        let mut tx = Transaction::begin(1, &mut d);
        {
            let mut root = tx.root_map().unwrap();
            let mut items = root.list("items").unwrap();
            items.push(4).unwrap();
            items.pop(None).unwrap();
            root.set("total", 1).unwrap();
        }
        let pending = tx.pending();
        assert_eq!(pending.appends, 1);
        assert_eq!(pending.pops, 1);
        assert_eq!(pending.sets, 1);
        assert_eq!(pending.total(), tx.entries().len());
    }
}
