//! A container is shadowed at most once per transaction.

use crate::common::*;
use std::str::FromStr;

#[test]
fn test_same_container_yields_same_shadow() {
    let mut domain = order_domain();
    let original = {
        let root = domain.root();
        match domain.arena().get(root).unwrap() {
            pop_core::Container::Map(m) => match m.get("customer").unwrap() {
                pop_core::Node::Container(h) => *h,
                other => panic!("customer is not a container: {:?}", other),
            },
            other => panic!("root is not a map: {:?}", other),
        }
    };

    let mut tx = Transaction::begin(1, &mut domain);
    let path = FieldPath::from_str("customer").unwrap();
    let first = tx.map_at(&path).unwrap().handle();
    let second = tx.map_at(&path).unwrap().handle();
    assert_eq!(first, second);
    assert_ne!(first, original);
    assert_eq!(tx.get_shadow(original).unwrap(), first);

    // root + customer
    assert_eq!(tx.shadow_count(), 2);

    let tags = FieldPath::from_str("customer.tags").unwrap();
    tx.list_at(&tags).unwrap().push("new").unwrap();
    tx.list_at(&tags).unwrap().push("newer").unwrap();
    assert_eq!(tx.shadow_count(), 3);
    tx.rollback().unwrap();
}

#[test]
fn test_repeated_guard_access_logs_each_write_once() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_tags",
            Process::contracted(
                ProcessContract::new().inputs(["customer"]).outputs(["customer"]),
                |guard, _args| {
                    for tag in ["a", "b", "c"] {
                        guard.map_mut("customer")?.list("tags")?.push(tag)?;
                    }
                    Ok(Value::Null)
                },
            ),
        )
        .unwrap();

    engine.run_process("p_tags", &Args::new()).unwrap();
    assert_eq!(
        snapshot(&engine)["customer"]["tags"],
        serde_json::json!(["vip", "a", "b", "c"])
    );
    assert_eq!(engine.audit_log().last().unwrap().entries.len(), 3);
}
