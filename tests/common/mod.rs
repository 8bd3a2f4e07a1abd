//! Shared test utilities for the runtime integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

pub use pop::prelude::*;
use serde_json::json;
use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// The canonical order context: `{items: [1, 2, 3], total: 0}` plus a nested map
pub fn order_domain() -> DomainContext {
    DomainContext::from_json(json!({
        "items": [1, 2, 3],
        "total": 0,
        "customer": {"name": "Ana", "tags": ["vip"]},
        "x": "hidden"
    }))
    .unwrap()
}

pub fn order_global() -> GlobalContext {
    GlobalContext::from_json(json!({"tax_rate": 0.2, "max_items": 10})).unwrap()
}

pub fn engine(strict: bool) -> Engine {
    init_tracing();
    Engine::builder()
        .global(order_global())
        .domain(order_domain())
        .strict_mode(strict)
        .build()
        .unwrap()
}

/// Materialized domain layer as JSON
pub fn snapshot(engine: &Engine) -> serde_json::Value {
    engine.context().domain().to_value().unwrap().into()
}
