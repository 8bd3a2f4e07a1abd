//! End-to-end properties of the process runtime

#[path = "../common/mod.rs"]
mod common;

mod commit_atomicity;
mod contract_enforcement;
mod invocation_properties;
mod isolation;
mod lock_discipline;
mod shadow_identity;
mod undeclared_errors;
mod workflows;
