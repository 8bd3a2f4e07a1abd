//! Error types for the process runtime
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Kinds
//!
//! Every variant carries a stable *kind* name (see [`Error::kind`]). A process
//! contract declares the kinds it may raise; the engine compares the kind of a
//! failed invocation against that set to decide whether the error passes
//! through unchanged or is wrapped as an undeclared-error violation.
//!
//! | Variant | Kind |
//! |---------|------|
//! | `ProcessNotFound` | `ProcessNotFound` |
//! | `DuplicateProcess` | `DuplicateProcess` |
//! | `InvalidContract` | `InvalidContract` |
//! | `ContractViolation` | `ContractViolation` |
//! | `Raised` | chosen by the process |
//! | `Locked` | `LockViolation` |
//! | `KeyNotFound` | `KeyError` |
//! | `IndexOutOfRange` | `IndexError` |
//! | `TypeMismatch` | `TypeError` |
//! | `InvalidPath` | `PathError` |
//! | `MissingLayer` | `ConstructionError` |
//! | `InvalidState` | `InvalidState` |
//! | `Config` | `ConfigError` |

use crate::path::PathParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of field access checked against a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    /// Field read, checked against `inputs`
    Read,
    /// Field write, checked against `outputs`
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// What a process did that its contract does not allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Read or write of a field outside the declared inputs/outputs
    AccessDenied {
        /// Read or write
        access: Access,
        /// Layer-qualified field name (`domain.items`)
        field: String,
    },
    /// The process failed with an error kind absent from its `errors` set
    UndeclaredError {
        /// Kind of the original error
        kind: String,
        /// Message of the original error
        message: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::AccessDenied {
                access: Access::Read,
                field,
            } => write!(f, "read of '{}' is not declared in inputs", field),
            Violation::AccessDenied {
                access: Access::Write,
                field,
            } => write!(f, "write of '{}' is not declared in outputs", field),
            Violation::UndeclaredError { kind, message } => write!(
                f,
                "undeclared error '{}' (not listed in errors); original error: {}",
                kind, message
            ),
        }
    }
}

/// Error types for the process runtime
#[derive(Debug, Error)]
pub enum Error {
    /// No process registered under this name
    #[error("Process '{0}' not found in registry")]
    ProcessNotFound(String),

    /// A process with this name is already registered
    #[error("Process '{0}' is already registered")]
    DuplicateProcess(String),

    /// Contract rejected at registration
    #[error("Invalid contract for process '{process}': {reason}")]
    InvalidContract {
        /// Process the contract belongs to
        process: String,
        /// Why the contract was rejected
        reason: String,
    },

    /// A process broke its contract
    #[error("Contract violation [process: {process}]: {violation}")]
    ContractViolation {
        /// Offending process
        process: String,
        /// What was violated
        violation: Violation,
    },

    /// Domain error raised by a process
    #[error("{kind}: {message}")]
    Raised {
        /// Error kind, matched against the contract's `errors`
        kind: String,
        /// Human-readable message
        message: String,
    },

    /// Direct mutation attempted while the context is locked (strict mode)
    #[error("Context is locked: direct {operation} outside a process is not allowed")]
    Locked {
        /// The mutation that was denied
        operation: String,
    },

    /// Map key or field missing
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// List index out of range
    #[error("Index {index} out of range for '{path}' (len {len})")]
    IndexOutOfRange {
        /// Path of the list
        path: String,
        /// Requested index
        index: usize,
        /// List length
        len: usize,
    },

    /// Value at a path has the wrong type
    #[error("Type mismatch at '{path}': expected {expected}, found {actual}")]
    TypeMismatch {
        /// Path of the value
        path: String,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        actual: &'static str,
    },

    /// Unparsable field path
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathParseError),

    /// System context built without one of its layers
    #[error("System context is missing its {0} layer")]
    MissingLayer(&'static str),

    /// Operation on a transaction that is no longer active
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration read or parse failure
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Raise a domain error of the given kind
    ///
    /// This is how a process signals an expected failure:
    ///
    /// ```
    /// use pop_core::Error;
    ///
    /// let err = Error::raise("ValidationError", "total must be positive");
    /// assert_eq!(err.kind(), "ValidationError");
    /// ```
    pub fn raise(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Stable kind name used for contract error declarations
    pub fn kind(&self) -> &str {
        match self {
            Error::ProcessNotFound(_) => "ProcessNotFound",
            Error::DuplicateProcess(_) => "DuplicateProcess",
            Error::InvalidContract { .. } => "InvalidContract",
            Error::ContractViolation { .. } => "ContractViolation",
            Error::Raised { kind, .. } => kind.as_str(),
            Error::Locked { .. } => "LockViolation",
            Error::KeyNotFound(_) => "KeyError",
            Error::IndexOutOfRange { .. } => "IndexError",
            Error::TypeMismatch { .. } => "TypeError",
            Error::InvalidPath(_) => "PathError",
            Error::MissingLayer(_) => "ConstructionError",
            Error::InvalidState(_) => "InvalidState",
            Error::Config(_) => "ConfigError",
        }
    }

    /// Message without the kind prefix
    ///
    /// For raised errors this is the message the process supplied; for every
    /// other variant it is the full display text.
    pub fn message(&self) -> String {
        match self {
            Error::Raised { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Check whether this is a contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::ContractViolation { .. })
    }

    /// Build an access-denied violation for `process`
    pub fn access_denied(process: impl Into<String>, access: Access, field: impl Into<String>) -> Self {
        Error::ContractViolation {
            process: process.into(),
            violation: Violation::AccessDenied {
                access,
                field: field.into(),
            },
        }
    }

    /// Build a type mismatch error for the value at `path`
    pub fn type_mismatch(path: impl fmt::Display, expected: &'static str, actual: &'static str) -> Self {
        Error::TypeMismatch {
            path: path.to_string(),
            expected,
            actual,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
