//! Contract guard
//!
//! A [`Guard`] is the only view of the system context a contracted process
//! receives. It is built for one invocation from the process contract, the
//! read-only global layer and the invocation's [`Transaction`].
//!
//! | Operation | Permitted when | Routed to |
//! |-----------|----------------|-----------|
//! | `get`, `get_path` | top-level field in `inputs` | transaction view (domain) or global layer |
//! | `set`, `remove`, `push` | top-level field in `outputs` | shadow proxies |
//! | `map_mut`, `list_mut` | top-level field in `inputs` and `outputs` | shadow proxies |
//!
//! Paths are either layer-rooted (`global.rate`, `domain.user.name`) or bare,
//! in which case they are domain-relative (`user.name`). Permission is decided
//! by the top-level field alone; access to `user.name` needs `user`.
//!
//! Outputs do not imply inputs. A proxy can read what it wraps, so handing one
//! out needs both permissions, and `set`/`remove` only report the previous
//! value of a field the process may read.
//!
//! Every check happens before anything is touched, so a denied write leaves
//! no delta and no shadow behind.

use pop_core::{
    Access, Capabilities, Error, FieldPath, FieldRef, GlobalContext, Layer, PathSegment,
    ProcessContract, Result, Value,
};
use pop_transaction::{ShadowList, ShadowMap, Transaction};
use std::str::FromStr;
use tracing::warn;

/// Contract-checked access for one process invocation
pub struct Guard<'g, 'c> {
    process: &'g str,
    capabilities: Capabilities,
    global: &'g GlobalContext,
    tx: &'g mut Transaction<'c>,
}

impl<'g, 'c> Guard<'g, 'c> {
    /// Resolve `contract` and wrap the invocation state
    ///
    /// # Errors
    ///
    /// [`Error::InvalidContract`] if the contract does not resolve.
    pub fn new(
        process: &'g str,
        contract: &ProcessContract,
        global: &'g GlobalContext,
        tx: &'g mut Transaction<'c>,
    ) -> Result<Self> {
        contract.validate(process)?;
        let capabilities = contract.capabilities()?;
        Ok(Self {
            process,
            capabilities,
            global,
            tx,
        })
    }

    /// Name of the running process
    pub fn process(&self) -> &str {
        self.process
    }

    /// Resolved capability table
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Id of the invocation's transaction
    pub fn txn_id(&self) -> u64 {
        self.tx.txn_id()
    }

    // === Reads ===

    /// Read a field or path
    ///
    /// Domain reads see this invocation's own writes and never create
    /// shadows.
    pub fn get(&self, path: &str) -> Result<Value> {
        let (field, rel) = self.resolve(path)?;
        self.check(&field, Access::Read)?;
        match field.layer {
            Layer::Global => self.global.get_path(&rel),
            Layer::Domain => self.tx.read_path(&rel),
        }
    }

    /// Read a field or path, `None` if it does not exist
    pub fn get_opt(&self, path: &str) -> Result<Option<Value>> {
        match self.get(path) {
            Ok(value) => Ok(Some(value)),
            Err(Error::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // === Writes ===

    /// Assign the value at a path
    ///
    /// Map keys are created if missing; list indexes must exist. The previous
    /// value is returned only when the field is also declared in `inputs`.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let (field, parent, last) = self.write_target(path)?;
        let old = match last {
            PathSegment::Key(key) => self.tx.map_at(&parent)?.set(&key, value)?,
            PathSegment::Index(index) => Some(self.tx.list_at(&parent)?.set(index, value)?),
        };
        Ok(old.filter(|_| self.capabilities.can_read(&field)))
    }

    /// Remove the value at a path
    ///
    /// Returns the removed value when the field is also declared in `inputs`.
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>> {
        let (field, parent, last) = self.write_target(path)?;
        let old = match last {
            PathSegment::Key(key) => self.tx.map_at(&parent)?.remove(&key)?,
            PathSegment::Index(index) => self.tx.list_at(&parent)?.remove(index)?,
        };
        Ok(Some(old).filter(|_| self.capabilities.can_read(&field)))
    }

    /// Append to the list at a path
    ///
    /// Needs write access only; nothing is read back.
    pub fn push(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let (_, rel) = self.writable(path)?;
        self.tx.list_at(&rel)?.push(value)
    }

    /// Mutable proxy over the map at a path
    ///
    /// The field must be declared in both `outputs` and `inputs`.
    pub fn map_mut(&mut self, path: &str) -> Result<ShadowMap<'_, 'c>> {
        let rel = self.read_writable(path)?;
        self.tx.map_at(&rel)
    }

    /// Mutable proxy over the list at a path
    ///
    /// The field must be declared in both `outputs` and `inputs`.
    pub fn list_mut(&mut self, path: &str) -> Result<ShadowList<'_, 'c>> {
        let rel = self.read_writable(path)?;
        self.tx.list_at(&rel)
    }

    // === Checks ===

    /// Split a path into its top-level field and the layer-relative path
    fn resolve(&self, path: &str) -> Result<(FieldRef, FieldPath)> {
        let path = FieldPath::from_str(path)?;
        let (layer, rel) = match path.first_key().and_then(Layer::from_name) {
            Some(layer) if path.len() >= 2 => (layer, path.tail()),
            _ => (Layer::Domain, path),
        };
        let name = rel
            .first_key()
            .ok_or_else(|| Error::KeyNotFound(format!("{}{}", layer, rel)))?;
        let field = FieldRef {
            layer,
            name: name.to_string(),
        };
        Ok((field, rel))
    }

    fn check(&self, field: &FieldRef, access: Access) -> Result<()> {
        let allowed = match access {
            Access::Read => self.capabilities.can_read(field),
            Access::Write => field.layer == Layer::Domain && self.capabilities.can_write(field),
        };
        if allowed {
            return Ok(());
        }
        warn!(
            target: "pop::guard",
            process = self.process,
            access = %access,
            field = %field,
            "Contract violation"
        );
        Err(Error::access_denied(self.process, access, field.to_string()))
    }

    /// Check write access and return the field with its domain-relative path
    fn writable(&self, path: &str) -> Result<(FieldRef, FieldPath)> {
        let (field, rel) = self.resolve(path)?;
        self.check(&field, Access::Write)?;
        Ok((field, rel))
    }

    fn read_writable(&self, path: &str) -> Result<FieldPath> {
        let (field, rel) = self.writable(path)?;
        self.check(&field, Access::Read)?;
        Ok(rel)
    }

    fn write_target(&self, path: &str) -> Result<(FieldRef, FieldPath, PathSegment)> {
        let (field, rel) = self.writable(path)?;
        let last = rel
            .last_segment()
            .cloned()
            .ok_or_else(|| Error::InvalidState("cannot replace the domain root".to_string()))?;
        Ok((field, rel.parent().unwrap_or_default(), last))
    }
}

impl std::fmt::Debug for Guard<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("process", &self.process)
            .field("txn_id", &self.tx.txn_id())
            .finish()
    }
}
