use crate::common::*;
use serde_json::json;

fn pipeline_engine() -> Engine {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_add_item",
            Process::contracted(ProcessContract::new().outputs(["items"]), |guard, args| {
                guard.push("items", args.get("item").cloned().unwrap_or(Value::Null))?;
                Ok(Value::Null)
            }),
        )
        .unwrap();
    engine
        .register_process(
            "p_sum",
            Process::contracted(
                ProcessContract::new().inputs(["items"]).outputs(["total"]),
                |guard, _args| {
                    let sum: i64 = guard
                        .get("items")?
                        .as_list()
                        .unwrap_or(&[])
                        .iter()
                        .filter_map(Value::as_int)
                        .sum();
                    guard.set("total", sum)?;
                    Ok(Value::Int(sum))
                },
            ),
        )
        .unwrap();
    engine
        .register_process(
            "p_cap",
            Process::contracted(
                ProcessContract::new()
                    .inputs(["items", "global.max_items"])
                    .errors(["CapacityError"]),
                |guard, _args| {
                    let count = guard.get("items")?.as_list().map(|l| l.len()).unwrap_or(0);
                    let max = guard.get("global.max_items")?.as_int().unwrap_or(0);
                    if count as i64 > max {
                        return Err(Error::raise("CapacityError", "too many items"));
                    }
                    Ok(Value::Null)
                },
            ),
        )
        .unwrap();
    engine
}

fn item(value: i64) -> Args {
    let mut args = Args::new();
    args.insert("item".to_string(), Value::Int(value));
    args
}

#[test]
fn test_pipeline_returns_final_context() {
    let mut engine = pipeline_engine();
    let steps: Vec<WorkflowStep> = serde_json::from_value(json!([
        "p_add_item",
        {"process": "p_cap"},
        {"comment": "placeholder"},
        {"process": "p_sum"}
    ]))
    .unwrap();

    let ctx = engine.execute_workflow(&steps, &item(4)).unwrap();
    assert_eq!(ctx.get_path("domain.total").unwrap(), Value::Int(10));
    assert_eq!(engine.metrics().total_committed, 3);
}

#[test]
fn test_pipeline_stops_at_first_error() {
    let mut engine = pipeline_engine();
    let steps: Vec<WorkflowStep> = std::iter::repeat("p_add_item")
        .take(8)
        .chain(["p_cap", "p_sum"])
        .map(WorkflowStep::from)
        .collect();

    let err = engine.execute_workflow(&steps, &item(1)).unwrap_err();
    assert_eq!(err.kind(), "CapacityError");

    // the eight additions stay committed; p_sum never ran
    let domain = snapshot(&engine);
    assert_eq!(domain["items"].as_array().unwrap().len(), 11);
    assert_eq!(domain["total"], json!(0));
    assert_eq!(engine.last_invocation().unwrap().process, "p_cap");
}

#[test]
fn test_empty_workflow() {
    let mut engine = pipeline_engine();
    let ctx = engine.execute_workflow(&[], &Args::new()).unwrap();
    assert_eq!(ctx.get_path("domain.total").unwrap(), Value::Int(0));
}
