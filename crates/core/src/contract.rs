//! Process contracts
//!
//! A [`ProcessContract`] declares what a process may touch:
//!
//! - `inputs`: fields it may read
//! - `outputs`: fields it may write
//! - `errors`: error kinds it may fail with
//!
//! Field names are either layer-qualified (`domain.items`, `global.tax_rate`)
//! or bare (`items`), in which case they refer to the domain layer. The global
//! layer is immutable, so a contract naming a global output is rejected.
//!
//! Before a process runs, its contract is resolved once into a
//! [`Capabilities`] table; the guard consults only that table afterwards.

use crate::context::Layer;
use crate::error::{Error, Result};
use crate::path::{FieldPath, PathSegment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Contract attached to a process at definition time
///
/// # Example
///
/// ```
/// use pop_core::ProcessContract;
///
/// let contract = ProcessContract::new()
///     .inputs(["items", "global.tax_rate"])
///     .outputs(["items", "total"])
///     .errors(["ValidationError"]);
///
/// assert!(contract.declares_error("ValidationError"));
/// assert!(contract.capabilities().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessContract {
    /// Readable field names
    #[serde(default)]
    pub inputs: BTreeSet<String>,
    /// Writable field names
    #[serde(default)]
    pub outputs: BTreeSet<String>,
    /// Error kinds the process may raise
    #[serde(default)]
    pub errors: BTreeSet<String>,
}

impl ProcessContract {
    /// Create an empty contract: reads nothing, writes nothing, raises nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add readable fields
    pub fn inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builder: add writable fields
    pub fn outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builder: add permitted error kinds
    pub fn errors<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Check whether an error kind is declared
    pub fn declares_error(&self, kind: &str) -> bool {
        self.errors.contains(kind)
    }

    /// Resolve field names into a capability table
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for an unparsable or nested name, and
    /// [`Error::InvalidContract`] for an output on the global layer. The
    /// process name is filled in by [`ProcessContract::validate`].
    pub fn capabilities(&self) -> Result<Capabilities> {
        let readable = self
            .inputs
            .iter()
            .map(|n| n.parse::<FieldRef>())
            .collect::<Result<HashSet<_>>>()?;
        let writable = self
            .outputs
            .iter()
            .map(|n| n.parse::<FieldRef>())
            .collect::<Result<HashSet<_>>>()?;
        if let Some(global) = writable.iter().find(|f| f.layer == Layer::Global) {
            return Err(Error::InvalidContract {
                process: String::new(),
                reason: format!("'{}' is on the read-only global layer", global),
            });
        }
        Ok(Capabilities { readable, writable })
    }

    /// Validate the contract for registration under `process`
    pub fn validate(&self, process: &str) -> Result<()> {
        self.capabilities().map(|_| ()).map_err(|e| match e {
            Error::InvalidContract { reason, .. } => Error::InvalidContract {
                process: process.to_string(),
                reason,
            },
            other => Error::InvalidContract {
                process: process.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

/// A top-level field on a specific layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// Layer the field lives on
    pub layer: Layer,
    /// Field name
    pub name: String,
}

impl FieldRef {
    /// Field on the domain layer
    pub fn domain(name: impl Into<String>) -> Self {
        Self {
            layer: Layer::Domain,
            name: name.into(),
        }
    }

    /// Field on the global layer
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            layer: Layer::Global,
            name: name.into(),
        }
    }
}

impl FromStr for FieldRef {
    type Err = Error;

    /// `items` and `domain.items` name the same field; `global.rate` names a
    /// global one. Deeper paths are not valid capability names.
    fn from_str(s: &str) -> Result<Self> {
        let path = FieldPath::from_str(s)?;
        let keys: Vec<&str> = path
            .segments()
            .iter()
            .map(|seg| match seg {
                PathSegment::Key(k) => Ok(k.as_str()),
                PathSegment::Index(_) => Err(()),
            })
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| invalid_name(s))?;

        match keys.as_slice() {
            [name] => Ok(FieldRef::domain(*name)),
            [layer, name] => match Layer::from_name(layer) {
                Some(layer) => Ok(FieldRef {
                    layer,
                    name: (*name).to_string(),
                }),
                None => Err(invalid_name(s)),
            },
            _ => Err(invalid_name(s)),
        }
    }
}

fn invalid_name(s: &str) -> Error {
    Error::InvalidContract {
        process: String::new(),
        reason: format!("'{}' is not a field name (expected `name` or `layer.name`)", s),
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.layer, self.name)
    }
}

/// Resolved read/write permissions of one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    readable: HashSet<FieldRef>,
    writable: HashSet<FieldRef>,
}

impl Capabilities {
    /// Check read permission
    pub fn can_read(&self, field: &FieldRef) -> bool {
        self.readable.contains(field)
    }

    /// Check write permission
    pub fn can_write(&self, field: &FieldRef) -> bool {
        self.writable.contains(field)
    }

    /// Number of readable fields
    pub fn readable_count(&self) -> usize {
        self.readable.len()
    }

    /// Number of writable fields
    pub fn writable_count(&self) -> usize {
        self.writable.len()
    }
}
