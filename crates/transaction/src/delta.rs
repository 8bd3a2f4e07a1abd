//! Delta log entries
//!
//! Every discrete mutation made through a shadow proxy appends exactly one
//! [`DeltaEntry`] to the owning transaction. The committed sequence doubles as
//! the audit trail of an invocation.

use pop_core::{FieldPath, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation recorded in a [`DeltaEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaOp {
    /// Map key or list slot assigned
    Set,
    /// Map key or list slot deleted
    Remove,
    /// One value pushed onto a list
    Append,
    /// Several values pushed onto a list
    Extend,
    /// Value removed from a list by position
    Pop,
    /// Value inserted into a list at a position
    Insert,
}

impl DeltaOp {
    /// Upper-case name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaOp::Set => "SET",
            DeltaOp::Remove => "REMOVE",
            DeltaOp::Append => "APPEND",
            DeltaOp::Extend => "EXTEND",
            DeltaOp::Pop => "POP",
            DeltaOp::Insert => "INSERT",
        }
    }
}

impl fmt::Display for DeltaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded mutation
///
/// Path conventions:
///
/// | Operation | Path | `new_value` | `old_value` |
/// |-----------|------|-------------|-------------|
/// | `Set` | `parent.key` / `parent[i]` | assigned value | previous value, if any |
/// | `Remove` | `parent.key` / `parent[i]` | none | removed value |
/// | `Append` | list path | pushed value | none |
/// | `Extend` | list path | list of pushed values | none |
/// | `Insert` | `parent[i]` | inserted value | none |
/// | `Pop` | `parent[i]` | none | popped value |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEntry {
    /// Layer-rooted path of the mutated location
    pub path: FieldPath,
    /// Kind of mutation
    pub op: DeltaOp,
    /// Value written, if the operation writes one
    pub new_value: Option<Value>,
    /// Value replaced or removed, if there was one
    pub old_value: Option<Value>,
}

impl DeltaEntry {
    /// Create an entry
    pub fn new(path: FieldPath, op: DeltaOp, new_value: Option<Value>, old_value: Option<Value>) -> Self {
        Self {
            path,
            op,
            new_value,
            old_value,
        }
    }
}

impl fmt::Display for DeltaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.path)?;
        if let Some(old) = &self.old_value {
            write!(f, " old={}", old)?;
        }
        if let Some(new) = &self.new_value {
            write!(f, " new={}", new)?;
        }
        Ok(())
    }
}

/// Summary of logged operations, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of `Set` entries
    pub sets: usize,
    /// Number of `Remove` entries
    pub removes: usize,
    /// Number of `Append` and `Extend` entries
    pub appends: usize,
    /// Number of `Insert` entries
    pub inserts: usize,
    /// Number of `Pop` entries
    pub pops: usize,
}

impl PendingOperations {
    /// Tally a sequence of entries
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a DeltaEntry>) -> Self {
        let mut pending = Self::default();
        for entry in entries {
            match entry.op {
                DeltaOp::Set => pending.sets += 1,
                DeltaOp::Remove => pending.removes += 1,
                DeltaOp::Append | DeltaOp::Extend => pending.appends += 1,
                DeltaOp::Insert => pending.inserts += 1,
                DeltaOp::Pop => pending.pops += 1,
            }
        }
        pending
    }

    /// Total number of operations
    pub fn total(&self) -> usize {
        self.sets + self.removes + self.appends + self.inserts + self.pops
    }
}
