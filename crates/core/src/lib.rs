//! Core types for the process runtime
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for every datum in a context layer
//! - FieldPath: Dotted/bracketed locator into the context tree
//! - Arena: Handle-indexed container slots backing the domain layer
//! - Context: GlobalContext, DomainContext and the SystemContext wrapper
//! - ProcessContract: Declared inputs, outputs and error kinds of a process
//! - LockManager: Gate for direct, unguarded mutation
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod context;
pub mod contract;
pub mod error;
pub mod lock;
pub mod path;
pub mod value;

pub use arena::{Arena, ArenaCheckpoint, Container, Handle, Node};
pub use context::{DomainContext, GlobalContext, Layer, SystemContext, SystemContextBuilder};
pub use contract::{Capabilities, FieldRef, ProcessContract};
pub use error::{Access, Error, Result, Violation};
pub use lock::{
    parse_flag, resolve_strict_mode, resolve_strict_mode_from, LockManager, LockState,
    UnlockScope, STRICT_MODE_ENV,
};
pub use path::{validate_key, FieldPath, PathParseError, PathSegment};
pub use value::Value;
