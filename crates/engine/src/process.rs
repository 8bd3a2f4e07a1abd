//! Process definitions
//!
//! A process is registered in one of two forms, decided once at
//! registration:
//!
//! - [`Process::Contracted`]: runs behind a [`Guard`] inside a transaction.
//! - [`Process::Unchecked`]: runs with direct access to the context and no
//!   transaction. Registration logs a warning.

use crate::engine::Unguarded;
use crate::guard::Guard;
use pop_core::{ProcessContract, Result, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Named arguments passed to every step of an invocation
pub type Args = BTreeMap<String, Value>;

/// Body of a contracted process
pub type ContractedFn = Box<dyn Fn(&mut Guard<'_, '_>, &Args) -> Result<Value>>;

/// Body of an unchecked process
pub type UncheckedFn = Box<dyn Fn(&mut Unguarded<'_>, &Args) -> Result<Value>>;

/// A unit of logic registered with the engine
pub enum Process {
    /// Guarded, transactional process
    Contracted {
        /// Declared inputs, outputs and errors
        contract: ProcessContract,
        /// Process body
        body: ContractedFn,
    },
    /// Process with raw context access
    Unchecked {
        /// Process body
        body: UncheckedFn,
    },
}

impl Process {
    /// Define a contracted process
    ///
    /// ```
    /// use pop_core::{ProcessContract, Value};
    /// use pop_engine::Process;
    ///
    /// let p = Process::contracted(
    ///     ProcessContract::new().inputs(["items"]).outputs(["total"]),
    ///     |guard, _args| {
    ///         let n = guard.get("items")?.as_list().map(|l| l.len()).unwrap_or(0);
    ///         guard.set("total", n)?;
    ///         Ok(Value::Null)
    ///     },
    /// );
    /// assert!(p.is_contracted());
    /// ```
    pub fn contracted<F>(contract: ProcessContract, body: F) -> Self
    where
        F: Fn(&mut Guard<'_, '_>, &Args) -> Result<Value> + 'static,
    {
        Process::Contracted {
            contract,
            body: Box::new(body),
        }
    }

    /// Define an unchecked process
    pub fn unchecked<F>(body: F) -> Self
    where
        F: Fn(&mut Unguarded<'_>, &Args) -> Result<Value> + 'static,
    {
        Process::Unchecked {
            body: Box::new(body),
        }
    }

    /// Contract, if the process has one
    pub fn contract(&self) -> Option<&ProcessContract> {
        match self {
            Process::Contracted { contract, .. } => Some(contract),
            Process::Unchecked { .. } => None,
        }
    }

    /// Whether the process runs guarded
    pub fn is_contracted(&self) -> bool {
        matches!(self, Process::Contracted { .. })
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Contracted { contract, .. } => f
                .debug_struct("Contracted")
                .field("contract", contract)
                .finish_non_exhaustive(),
            Process::Unchecked { .. } => f.debug_struct("Unchecked").finish_non_exhaustive(),
        }
    }
}

/// Lifecycle of one invocation
///
/// `Pending → Running → {Committed | RolledBack}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Looked up, not yet started
    Pending,
    /// Body executing
    Running,
    /// Changes applied
    Committed,
    /// Changes discarded
    RolledBack,
}

impl InvocationState {
    /// True for `Committed` and `RolledBack`
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Committed | InvocationState::RolledBack)
    }
}

/// Outcome of the most recent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    /// Transaction id; `None` for unchecked runs
    pub txn_id: Option<u64>,
    /// Process name
    pub process: String,
    /// Final state
    pub state: InvocationState,
    /// Kind of the error that ended the invocation, if any
    pub error_kind: Option<String>,
}
