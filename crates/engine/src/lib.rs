//! Process engine for the runtime
//!
//! This crate orchestrates the lower layers:
//! - Engine: process registry, invocation and workflows
//! - Guard: contract-checked context access for one invocation
//! - Transaction coordination and metrics
//! - Audit trail of committed delta logs
//! - Configuration (`pop.toml`)
//!
//! The engine is the only component that knows about:
//! - The lock discipline around invocations
//! - Classification of process errors against contracts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod guard;
pub mod process;
pub mod workflow;

pub use audit::{AuditLog, AuditRecord};
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use coordinator::{InvocationCoordinator, InvocationMetrics};
pub use engine::{Engine, EngineBuilder, Unguarded};
pub use guard::Guard;
pub use process::{Args, ContractedFn, InvocationRecord, InvocationState, Process, UncheckedFn};
pub use workflow::WorkflowStep;
