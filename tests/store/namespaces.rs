//! Account namespace provisioning, teardown and account switches.

use crate::common::*;

#[test]
fn delete_account_namespace_removes_every_partition() {
    let t = TestStore::new();
    t.sign_in("alice");
    for (partition, id) in [("user", "a"), ("Reports", "b"), ("Inbox", "c")] {
        t.store
            .upsert(
                &account_key(partition, "alice", id),
                doc(serde_json::json!({})),
                Some(PendingOperation::Create),
                None,
            )
            .unwrap();
    }
    let shared = shared_key("readonly", "kept");
    t.store.upsert(&shared, doc(serde_json::json!({})), None, None).unwrap();

    t.store.delete_account_namespace(&account("alice")).unwrap();
    t.store.delete_account_namespace(&account("alice")).unwrap();

    for (partition, id) in [("user", "a"), ("Reports", "b"), ("Inbox", "c")] {
        assert!(t.store.get(&account_key(partition, "alice", id)).unwrap().is_none());
    }
    assert!(t.store.get(&shared).unwrap().is_some());
    assert!(t.store.pending_operations(None, None).unwrap().is_empty());
    assert_eq!(t.store.stats().account_namespaces, 0);
}

#[test]
fn namespace_can_be_recreated_after_teardown() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("user", "alice", "doc");

    t.store
        .upsert(&key, doc(serde_json::json!({"v": 1})), None, None)
        .unwrap();
    t.store.delete_account_namespace(&account("alice")).unwrap();

    assert_eq!(
        t.store
            .upsert(&key, doc(serde_json::json!({"v": 2})), None, None)
            .unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(body(&t.store.get_required(&key).unwrap()), serde_json::json!({"v": 2}));
}

#[test]
fn teardown_survives_reopen() {
    let t = TestStore::new();
    t.sign_in("alice");
    t.store
        .upsert(&account_key("user", "alice", "doc"), doc(serde_json::json!({})), None, None)
        .unwrap();
    t.store.create_account_namespace(&account("bob")).unwrap();
    t.store.delete_account_namespace(&account("alice")).unwrap();

    let t = t.reopen();
    assert_eq!(t.store.account_namespaces(), vec![account("bob")]);
    assert!(t
        .store
        .get(&account_key("user", "alice", "doc"))
        .unwrap()
        .is_none());
}

#[test]
fn account_switch_keeps_previous_data() {
    let t = TestStore::new();
    t.sign_in("alice");
    t.store.on_account_changed(None, Some(&account("alice"))).unwrap();
    let key = account_key("user", "alice", "draft");
    t.store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap();

    t.advance(HOUR);
    t.sign_in("bob");
    t.store
        .on_account_changed(Some(&account("alice")), Some(&account("bob")))
        .unwrap();

    assert_eq!(t.store.account_namespaces(), vec![account("alice"), account("bob")]);
    // alice's pending change can still be drained.
    let pending = t.store.pending_operations(None, None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].written_by, Some(account("alice")));
    assert_eq!(t.store.stale_account_namespaces().unwrap(), Vec::<AccountId>::new());

    t.store.mark_in_flight(&key).unwrap();
    t.store.confirm_synced(&key, PendingOperation::Create).unwrap();
    assert_eq!(t.store.stale_account_namespaces().unwrap(), vec![account("alice")]);
}

#[test]
fn sign_out_provisions_nothing() {
    let t = TestStore::new();
    t.sign_in("alice");
    t.sign_out();
    t.store.on_account_changed(Some(&account("alice")), None).unwrap();
    assert!(t.store.account_namespaces().is_empty());
}

#[test]
fn manual_provisioning_gates_first_write() {
    let t = TestStore::with_config(test_config().with_auto_create_namespaces(false));
    t.sign_in("carol");
    let key = account_key("user", "carol", "doc");

    let err = t
        .store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap_err();
    assert!(matches!(err, Error::Schema(SchemaError::NamespaceNotReady { .. })));

    t.store.create_account_namespace(&account("carol")).unwrap();
    t.store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap();
    assert_eq!(t.store.stats().pending, 1);
}
