use crate::common::*;
use serde_json::json;

#[test]
fn test_undeclared_error_wraps_original_kind() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_pay",
            Process::contracted(
                ProcessContract::new()
                    .outputs(["total"])
                    .errors(["ValidationError"]),
                |guard, _args| {
                    guard.set("total", 100)?;
                    Err(Error::raise("PaymentGatewayDown", "timeout after 30s"))
                },
            ),
        )
        .unwrap();

    let err = engine.run_process("p_pay", &Args::new()).unwrap_err();
    assert_eq!(err.kind(), "ContractViolation");
    assert!(err.to_string().contains("PaymentGatewayDown"));
    match err {
        Error::ContractViolation {
            process,
            violation: Violation::UndeclaredError { kind, message },
        } => {
            assert_eq!(process, "p_pay");
            assert_eq!(kind, "PaymentGatewayDown");
            assert_eq!(message, "timeout after 30s");
        }
        other => panic!("expected undeclared error, got {:?}", other),
    }

    // rollback observed
    assert_eq!(snapshot(&engine)["total"], json!(0));
    let last = engine.last_invocation().unwrap();
    assert_eq!(last.error_kind.as_deref(), Some("ContractViolation"));
}

#[test]
fn test_type_error_inside_body_is_undeclared() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_misuse",
            Process::contracted(
                ProcessContract::new().inputs(["total"]).outputs(["total"]),
                |guard, _args| {
                    // total is a scalar
                    guard.list_mut("total")?.push(1)?;
                    Ok(Value::Null)
                },
            ),
        )
        .unwrap();

    match engine.run_process("p_misuse", &Args::new()).unwrap_err() {
        Error::ContractViolation {
            violation: Violation::UndeclaredError { kind, .. },
            ..
        } => assert_eq!(kind, "TypeError"),
        other => panic!("expected undeclared error, got {:?}", other),
    }
}
