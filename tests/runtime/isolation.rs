//! A failed process leaves the domain layer exactly as it found it.

use crate::common::*;
use serde_json::json;

#[test]
fn test_validation_error_leaves_context_unchanged() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_checkout",
            Process::contracted(
                ProcessContract::new()
                    .outputs(["items", "total"])
                    .errors(["ValidationError"]),
                |guard, _args| {
                    guard.push("items", 4)?;
                    guard.set("total", 10)?;
                    Err(Error::raise("ValidationError", "cart rejected"))
                },
            ),
        )
        .unwrap();

    let err = engine.run_process("p_checkout", &Args::new()).unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
    assert!(!err.is_contract_violation());

    let domain = snapshot(&engine);
    assert_eq!(domain["items"], json!([1, 2, 3]));
    assert_eq!(domain["total"], json!(0));
}

#[test]
fn test_many_mutations_then_error() {
    let mut engine = engine(true);
    let before = snapshot(&engine);
    engine
        .register_process(
            "p_churn",
            Process::contracted(
                ProcessContract::new()
                    .inputs(["items", "customer"])
                    .outputs(["items", "customer", "total"])
                    .errors(["Abort"]),
                |guard, _args| {
                    for i in 0..20 {
                        guard.push("items", i)?;
                    }
                    guard.list_mut("items")?.pop(Some(0))?;
                    guard.list_mut("items")?.insert(0, "head")?;
                    guard.remove("customer.name")?;
                    guard.map_mut("customer")?.list("tags")?.extend(["a", "b"])?;
                    guard.set("customer.address", json!({"city": "Porto"}))?;
                    guard.set("total", 99.5)?;
                    Err(Error::raise("Abort", "late failure"))
                },
            ),
        )
        .unwrap();

    assert!(engine.run_process("p_churn", &Args::new()).is_err());
    assert_eq!(snapshot(&engine), before);
}

#[test]
fn test_failure_does_not_affect_earlier_commit() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_set_total",
            Process::contracted(ProcessContract::new().outputs(["total"]), |guard, args| {
                guard.set("total", args.get("total").cloned().unwrap_or(Value::Null))?;
                Ok(Value::Null)
            }),
        )
        .unwrap();
    engine
        .register_process(
            "p_reject",
            Process::contracted(
                ProcessContract::new().outputs(["total"]).errors(["Rejected"]),
                |guard, _args| {
                    guard.set("total", -1)?;
                    Err(Error::raise("Rejected", "no"))
                },
            ),
        )
        .unwrap();

    let mut args = Args::new();
    args.insert("total".to_string(), Value::Int(5));
    engine.run_process("p_set_total", &args).unwrap();
    assert!(engine.run_process("p_reject", &Args::new()).is_err());
    assert_eq!(snapshot(&engine)["total"], json!(5));
}
