//! Partition scoping rules and the signed-in account check.

use crate::common::*;

#[test]
fn user_partition_requires_an_account() {
    let t = TestStore::new();
    let key = shared_key("user", "doc");

    let err = t
        .store
        .upsert(&key, doc(serde_json::json!({})), None, None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::InvalidAccountId { .. })
    ));
    assert!(t.store.get(&key).is_err());
    assert!(t.store.delete(&key).is_err());
}

#[test]
fn readonly_partition_rejects_an_account() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("readonly", "alice", "doc");

    let err = t
        .store
        .upsert(&key, doc(serde_json::json!({})), None, None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::InvalidPartition { .. })
    ));
    assert!(t.store.account_namespaces().is_empty());
}

#[test]
fn pending_write_for_signed_out_account_is_rejected() {
    let t = TestStore::new();
    t.sign_in("bob");
    let key = account_key("user", "alice", "doc");

    let err = t
        .store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap_err();
    match err {
        Error::Validation(ValidationError::AccountNotCurrent { account_id, current }) => {
            assert_eq!(account_id, "alice");
            assert_eq!(current.as_deref(), Some("bob"));
        }
        other => panic!("expected AccountNotCurrent, got {:?}", other),
    }
    assert!(t.store.account_namespaces().is_empty());
}

#[test]
fn cache_fill_for_other_account_is_allowed() {
    let t = TestStore::new();
    t.sign_in("bob");
    let key = account_key("user", "alice", "doc");

    t.store
        .upsert(&key, doc(serde_json::json!({"from": "server"})), None, None)
        .unwrap();
    assert!(t.store.get(&key).unwrap().is_some());

    // Deleting is a local change and needs the owner signed in.
    let err = t.store.delete(&key).unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::AccountNotCurrent { .. })
    ));
}

#[test]
fn store_without_identity_skips_account_check() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open_with_config(dir.path(), test_config()).unwrap();
    let key = account_key("user", "alice", "doc");

    store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap();
    assert_eq!(store.delete(&key).unwrap(), DeleteOutcome::Removed);

    let pending_key = account_key("user", "carol", "doc");
    store
        .upsert(&pending_key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap();
    let pending = store.pending_operations(None, None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].written_by, None);
}

#[test]
fn accounts_are_isolated() {
    let t = TestStore::new();
    t.sign_in("alice");
    let alice = account_key("user", "alice", "shared-id");
    t.store
        .upsert(&alice, doc(serde_json::json!({"owner": "alice"})), Some(PendingOperation::Create), None)
        .unwrap();

    t.sign_in("bob");
    let bob = account_key("user", "bob", "shared-id");
    t.store
        .upsert(&bob, doc(serde_json::json!({"owner": "bob"})), Some(PendingOperation::Create), None)
        .unwrap();

    assert_eq!(body(&t.store.get_required(&alice).unwrap()), serde_json::json!({"owner": "alice"}));
    assert_eq!(body(&t.store.get_required(&bob).unwrap()), serde_json::json!({"owner": "bob"}));
    assert_eq!(
        t.store.list(&PartitionName::user(), Some(&account("bob"))).unwrap().len(),
        1
    );
}

#[test]
fn closed_store_rejects_operations() {
    let t = TestStore::new();
    let key = shared_key("readonly", "doc");
    t.store.close().unwrap();
    t.store.close().unwrap();

    assert!(matches!(t.store.get(&key), Err(Error::Closed)));
    assert!(matches!(
        t.store.upsert(&key, doc(serde_json::json!({})), None, None),
        Err(Error::Closed)
    ));
    assert!(matches!(t.store.sweep_expired(), Err(Error::Closed)));
}
