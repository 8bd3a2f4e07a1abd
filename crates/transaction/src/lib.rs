//! Transactions for the process runtime
//!
//! This crate implements copy-on-write isolation over a domain layer:
//! - DeltaEntry: one recorded mutation (path, operation, new value, old value)
//! - Transaction: shadow bookkeeping, delta log, commit and rollback
//! - ShadowMap / ShadowList: proxies that mutate shadow slots and log deltas
//!
//! # Example
//!
//! ```
//! use pop_core::{DomainContext, Value};
//! use pop_transaction::Transaction;
//!
//! let mut domain = DomainContext::from_json(serde_json::json!({"items": [1, 2]})).unwrap();
//! {
//!     let mut tx = Transaction::begin(1, &mut domain);
//!     tx.root_map().unwrap().list("items").unwrap().push(3).unwrap();
//!     let entries = tx.commit().unwrap();
//!     assert_eq!(entries.len(), 1);
//! }
//! assert_eq!(domain.get("items").unwrap(), Value::from(serde_json::json!([1, 2, 3])));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod delta;
pub mod shadow;
pub mod transaction;

pub use delta::{DeltaEntry, DeltaOp, PendingOperations};
pub use shadow::{ShadowList, ShadowMap};
pub use transaction::{Transaction, TransactionStatus};
