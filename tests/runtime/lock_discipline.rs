use crate::common::*;
use pop_core::{resolve_strict_mode_from, LockManager};

#[test]
fn test_strict_mode_denies_locked_mutation() {
    let mut engine = engine(true);
    let err = engine.unguarded().set("total", 5).unwrap_err();
    assert_eq!(err.kind(), "LockViolation");
    assert!(matches!(err, Error::Locked { ref operation } if operation == "set"));
    assert_eq!(snapshot(&engine)["total"], serde_json::json!(0));
}

#[test]
fn test_permissive_mode_allows_locked_mutation() {
    let mut engine = engine(false);
    engine.unguarded().push("items", 4).unwrap();
    assert_eq!(snapshot(&engine)["items"], serde_json::json!([1, 2, 3, 4]));
}

#[test]
fn test_edit_scope_unlocks_then_relocks() {
    let mut engine = engine(true);
    assert!(engine.lock().is_locked());
    {
        let mut raw = engine.edit();
        raw.set("total", 7).unwrap();
        raw.remove("x").unwrap();
    }
    assert!(engine.lock().is_locked());
    assert!(engine.unguarded().set("total", 8).is_err());

    let domain = snapshot(&engine);
    assert_eq!(domain["total"], serde_json::json!(7));
    assert!(domain.get("x").is_none());
}

#[test]
fn test_lock_restored_after_failed_invocation() {
    let mut engine = engine(true);
    engine
        .register_process(
            "p_fail",
            Process::contracted(ProcessContract::new().errors(["Nope"]), |_guard, _args| {
                Err(Error::raise("Nope", "failed"))
            }),
        )
        .unwrap();
    assert!(engine.run_process("p_fail", &Args::new()).is_err());
    assert!(engine.lock().is_locked());
    assert_eq!(engine.lock().depth(), 0);
}

#[test]
fn test_nested_scopes() {
    let lock = LockManager::strict();
    let outer = lock.scoped_unlock();
    {
        let inner = lock.scoped_unlock();
        assert_eq!(inner.depth(), 2);
    }
    assert!(!lock.is_locked());
    assert!(lock.check_mutation("set").is_ok());
    drop(outer);
    assert!(lock.is_locked());
    assert!(lock.check_mutation("set").is_err());
}

#[test]
fn test_strict_mode_resolution_order() {
    assert!(resolve_strict_mode_from(Some(true), Some("0")));
    assert!(!resolve_strict_mode_from(Some(false), Some("true")));
    assert!(resolve_strict_mode_from(None, Some(" Yes ")));
    assert!(!resolve_strict_mode_from(None, Some("maybe")));
    assert!(!resolve_strict_mode_from(None, None));
}
