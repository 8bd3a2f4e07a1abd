use crate::common::*;

fn expect_denied(err: Error, process_name: &str, expected_access: Access, expected_field: &str) {
    match err {
        Error::ContractViolation {
            process,
            violation: Violation::AccessDenied { access, field },
        } => {
            assert_eq!(process, process_name);
            assert_eq!(access, expected_access);
            assert_eq!(field, expected_field);
        }
        other => panic!("expected access denied, got {:?}", other),
    }
}

#[test]
fn test_undeclared_read_fails_before_any_mutation() {
    let mut engine = engine(true);
    let before = snapshot(&engine);
    engine
        .register_process(
            "p_snoop",
            Process::contracted(ProcessContract::new().outputs(["total"]), |guard, _args| {
                let x = guard.get("x")?;
                guard.set("total", x)?;
                Ok(Value::Null)
            }),
        )
        .unwrap();

    let err = engine.run_process("p_snoop", &Args::new()).unwrap_err();
    expect_denied(err, "p_snoop", Access::Read, "domain.x");
    assert_eq!(snapshot(&engine), before);
    assert!(engine.audit_log().is_empty());
}

#[test]
fn test_undeclared_write_rolls_back_earlier_writes() {
    let mut engine = engine(true);
    let before = snapshot(&engine);
    engine
        .register_process(
            "p_overreach",
            Process::contracted(ProcessContract::new().outputs(["total"]), |guard, _args| {
                guard.set("total", 1)?;
                guard.push("items", 4)?;
                Ok(Value::Null)
            }),
        )
        .unwrap();

    let err = engine.run_process("p_overreach", &Args::new()).unwrap_err();
    expect_denied(err, "p_overreach", Access::Write, "domain.items");
    assert_eq!(snapshot(&engine), before);
}

#[test]
fn test_output_only_list_cannot_be_read_through_proxy() {
    let mut engine = engine(true);
    let before = snapshot(&engine);
    engine
        .register_process(
            "p_blind_list",
            Process::contracted(
                ProcessContract::new().outputs(["items", "total"]),
                |guard, _args| {
                    guard.set("total", 1)?;
                    let first = guard.list_mut("items")?.get(0)?;
                    Ok(first)
                },
            ),
        )
        .unwrap();

    let err = engine.run_process("p_blind_list", &Args::new()).unwrap_err();
    expect_denied(err, "p_blind_list", Access::Read, "domain.items");
    assert_eq!(snapshot(&engine), before);
}

#[test]
fn test_output_only_map_cannot_be_read_through_proxy() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_blind_map",
            Process::contracted(ProcessContract::new().outputs(["customer"]), |guard, _args| {
                guard.map_mut("customer")?.get("name")
            }),
        )
        .unwrap();

    let err = engine.run_process("p_blind_map", &Args::new()).unwrap_err();
    expect_denied(err, "p_blind_map", Access::Read, "domain.customer");
}

#[test]
fn test_output_only_writes_do_not_return_previous_values() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_blind_writes",
            Process::contracted(
                ProcessContract::new().outputs(["x", "total", "customer", "items"]),
                |guard, _args| {
                    let mut seen = Vec::new();
                    seen.push(guard.set("x", "overwritten")?);
                    seen.push(guard.set("total", 5)?);
                    seen.push(guard.remove("customer.name")?);
                    seen.push(guard.set("items[0]", 10)?);
                    guard.push("items", 4)?;
                    Ok(Value::List(seen.into_iter().map(|v| v.unwrap_or(Value::Null)).collect()))
                },
            ),
        )
        .unwrap();

    let result = engine.run_process("p_blind_writes", &Args::new()).unwrap();
    assert_eq!(
        result,
        Value::List(vec![Value::Null, Value::Null, Value::Null, Value::Null])
    );

    // the writes themselves still commit
    let domain = snapshot(&engine);
    assert_eq!(domain["x"], serde_json::json!("overwritten"));
    assert_eq!(domain["total"], serde_json::json!(5));
    assert_eq!(domain["items"], serde_json::json!([10, 2, 3, 4]));
    assert!(domain["customer"].get("name").is_none());
}

#[test]
fn test_readable_output_returns_previous_value() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_swap",
            Process::contracted(
                ProcessContract::new().inputs(["total"]).outputs(["total"]),
                |guard, _args| Ok(guard.set("total", 8)?.unwrap_or(Value::Null)),
            ),
        )
        .unwrap();

    assert_eq!(engine.run_process("p_swap", &Args::new()).unwrap(), Value::Int(0));
}

#[test]
fn test_global_layer_is_read_only() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_rate",
            Process::contracted(
                ProcessContract::new().inputs(["global.tax_rate"]),
                |guard, _args| {
                    let rate = guard.get("global.tax_rate")?;
                    guard.set("global.tax_rate", 0.0)?;
                    Ok(rate)
                },
            ),
        )
        .unwrap();

    let err = engine.run_process("p_rate", &Args::new()).unwrap_err();
    expect_denied(err, "p_rate", Access::Write, "global.tax_rate");
    assert_eq!(
        engine.context().get_path("global.tax_rate").unwrap(),
        Value::Float(0.2)
    );
}

#[test]
fn test_contract_with_global_output_rejected_at_registration() {
    let mut engine = engine(true);
    let err = engine
        .register_process(
            "p_bad",
            Process::contracted(ProcessContract::new().outputs(["global.max_items"]), |_g, _a| {
                Ok(Value::Null)
            }),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidContract");
    assert_eq!(engine.process_names().count(), 0);
}

#[test]
fn test_contract_from_json() {
    let contract: ProcessContract = serde_json::from_str(
        r#"{"inputs": ["items"], "outputs": ["total"], "errors": ["ValidationError"]}"#,
    )
    .unwrap();

    let mut engine = engine(true);
    engine
        .register_process(
            "p_count",
            Process::contracted(contract, |guard, _args| {
                let n = guard.get("items")?.as_list().map(|l| l.len()).unwrap_or(0);
                guard.set("total", n)?;
                Ok(Value::Null)
            }),
        )
        .unwrap();

    engine.run_process("p_count", &Args::new()).unwrap();
    assert_eq!(snapshot(&engine)["total"], serde_json::json!(3));
    assert!(engine
        .contract("p_count")
        .unwrap()
        .declares_error("ValidationError"));
}
