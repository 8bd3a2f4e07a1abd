//! POP - process-oriented runtime
//!
//! Business logic is written as small, named processes that read and write a
//! shared, layered context. Each process declares a contract (fields it reads,
//! fields it writes, error kinds it may raise) and runs inside a transaction:
//! all of its writes commit together or none of them do.
//!
//! # Quick Start
//!
//! ```
//! use pop::prelude::*;
//! use serde_json::json;
//!
//! let mut engine = Engine::builder()
//!     .global(GlobalContext::from_json(json!({"tax_rate": 0.1})).unwrap())
//!     .domain(DomainContext::from_json(json!({"items": [1, 2, 3], "total": 0})).unwrap())
//!     .build()
//!     .unwrap();
//!
//! engine
//!     .register_process(
//!         "p_total",
//!         Process::contracted(
//!             ProcessContract::new().inputs(["items"]).outputs(["total"]),
//!             |guard, _args| {
//!                 let n = guard.get("items")?.as_list().map(|l| l.len()).unwrap_or(0);
//!                 guard.set("total", n)?;
//!                 Ok(Value::Null)
//!             },
//!         ),
//!     )
//!     .unwrap();
//!
//! engine.run_process("p_total", &Args::new()).unwrap();
//! assert_eq!(engine.context().get_path("domain.total").unwrap(), Value::Int(3));
//! ```
//!
//! # Architecture
//!
//! - [`pop_core`]: values, paths, the arena-backed context layers, contracts
//!   and the lock manager
//! - [`pop_transaction`]: delta log and copy-on-write shadow containers
//! - [`pop_engine`]: contract guard, process registry, invocation and workflows

pub use pop_core;
pub use pop_engine;
pub use pop_transaction;

/// Commonly used types
pub mod prelude {
    pub use pop_core::{
        Access, DomainContext, Error, FieldPath, GlobalContext, ProcessContract, Result,
        SystemContext, Value, Violation,
    };
    pub use pop_engine::{Args, Engine, EngineConfig, Guard, Process, Unguarded, WorkflowStep};
    pub use pop_transaction::{DeltaEntry, DeltaOp, Transaction};
}
