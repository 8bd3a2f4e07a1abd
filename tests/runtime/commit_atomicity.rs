use crate::common::*;
use serde_json::json;

#[test]
fn test_both_writes_visible_after_success() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_ab",
            Process::contracted(ProcessContract::new().outputs(["a", "b"]), |guard, _args| {
                guard.set("a", 1)?;
                guard.set("b", json!({"nested": [true]}))?;
                Ok(Value::Null)
            }),
        )
        .unwrap();

    engine.run_process("p_ab", &Args::new()).unwrap();
    let domain = snapshot(&engine);
    assert_eq!(domain["a"], json!(1));
    assert_eq!(domain["b"], json!({"nested": [true]}));
}

#[test]
fn test_neither_write_visible_after_failure() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_ab",
            Process::contracted(
                ProcessContract::new().outputs(["a", "b"]).errors(["Halt"]),
                |guard, _args| {
                    guard.set("a", 1)?;
                    guard.set("b", 2)?;
                    Err(Error::raise("Halt", "after both writes"))
                },
            ),
        )
        .unwrap();

    assert!(engine.run_process("p_ab", &Args::new()).is_err());
    let domain = snapshot(&engine);
    assert!(domain.get("a").is_none());
    assert!(domain.get("b").is_none());
}

#[test]
fn test_commit_of_nested_edits() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_tag",
            Process::contracted(
                ProcessContract::new().inputs(["customer"]).outputs(["customer"]),
                |guard, _args| {
                    let mut customer = guard.map_mut("customer")?;
                    customer.list("tags")?.push("returning")?;
                    customer.set("name", "Ana Lima")?;
                    Ok(Value::Null)
                },
            ),
        )
        .unwrap();

    engine.run_process("p_tag", &Args::new()).unwrap();
    assert_eq!(
        snapshot(&engine)["customer"],
        json!({"name": "Ana Lima", "tags": ["vip", "returning"]})
    );

    let record = engine.audit_log().last().unwrap();
    let paths: Vec<String> = record.entries.iter().map(|e| e.path.to_string()).collect();
    assert_eq!(paths, vec!["domain.customer.tags", "domain.customer.name"]);
}
