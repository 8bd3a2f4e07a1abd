//! Property tests over whole invocations
//!
//! Random guard operation sequences either commit, matching a plain JSON
//! model, or fail with a declared error and leave the domain untouched.

use crate::common::*;
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    Push(i64),
    SetTotal(i64),
    SetItem(usize, i64),
    Tag(String),
    Rename(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i64>().prop_map(Op::Push),
        any::<i64>().prop_map(Op::SetTotal),
        (0usize..8, any::<i64>()).prop_map(|(i, v)| Op::SetItem(i, v)),
        "[a-z]{1,6}".prop_map(Op::Tag),
        "[A-Z][a-z]{0,5}".prop_map(Op::Rename),
    ]
}

fn apply(guard: &mut Guard<'_, '_>, op: &Op) -> Result<()> {
    match op {
        Op::Push(v) => guard.push("items", *v),
        Op::SetTotal(v) => guard.set("total", *v).map(|_| ()),
        Op::SetItem(i, v) => {
            let len = guard.get("items")?.as_list().map(|l| l.len()).unwrap_or(0);
            if *i < len {
                guard.set(&format!("items[{}]", i), *v)?;
            }
            Ok(())
        }
        Op::Tag(t) => guard.map_mut("customer")?.list("tags")?.push(t.as_str()),
        Op::Rename(n) => guard.set("customer.name", n.as_str()).map(|_| ()),
    }
}

fn apply_model(model: &mut serde_json::Value, op: &Op) {
    match op {
        Op::Push(v) => model["items"].as_array_mut().unwrap().push(json!(v)),
        Op::SetTotal(v) => model["total"] = json!(v),
        Op::SetItem(i, v) => {
            let items = model["items"].as_array_mut().unwrap();
            if *i < items.len() {
                items[*i] = json!(v);
            }
        }
        Op::Tag(t) => model["customer"]["tags"]
            .as_array_mut()
            .unwrap()
            .push(json!(t)),
        Op::Rename(n) => model["customer"]["name"] = json!(n),
    }
}

fn register(engine: &mut Engine, ops: Vec<Op>, fail: bool) {
    engine
        .register_process(
            "p_random",
            Process::contracted(
                ProcessContract::new()
                    .inputs(["items", "customer"])
                    .outputs(["items", "total", "customer"])
                    .errors(["Cancelled"]),
                move |guard, _args| {
                    for op in &ops {
                        apply(guard, op)?;
                    }
                    if fail {
                        return Err(Error::raise("Cancelled", "random failure"));
                    }
                    Ok(Value::Null)
                },
            ),
        )
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_failed_invocation_is_invisible(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let mut engine = engine(true);
        let before = snapshot(&engine);
        register(&mut engine, ops, true);

        let err = engine.run_process("p_random", &Args::new()).unwrap_err();
        prop_assert_eq!(err.kind(), "Cancelled");
        prop_assert_eq!(snapshot(&engine), before);
    }

    #[test]
    fn prop_committed_invocation_matches_model(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let mut engine = engine(true);
        let mut model = snapshot(&engine);
        for op in &ops {
            apply_model(&mut model, op);
        }
        register(&mut engine, ops, false);

        engine.run_process("p_random", &Args::new()).unwrap();
        prop_assert_eq!(snapshot(&engine), model);
    }
}
