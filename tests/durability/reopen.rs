//! State restored by reopening a store.

use crate::common::*;
use std::time::Duration;

#[test]
fn reopen_restores_records_and_metadata() {
    let t = TestStore::new();
    t.sign_in("alice");
    let synced = shared_key("readonly", "config");
    let created = account_key("user", "alice", "draft");
    let tombstoned = account_key("Reports", "alice", "old");

    t.store
        .upsert(&synced, doc(serde_json::json!({"v": 1})).with_etag("e1"), None, ttl(7200))
        .unwrap();
    t.store
        .upsert(&created, doc(serde_json::json!({"v": 2})), Some(PendingOperation::Create), None)
        .unwrap();
    t.store.mark_in_flight(&created).unwrap();
    t.store
        .upsert(&tombstoned, doc(serde_json::json!({"v": 3})), None, None)
        .unwrap();
    t.advance(Duration::from_secs(30));
    t.store.delete(&tombstoned).unwrap();

    let before_pending = t.store.pending_operations(None, None).unwrap();
    let before_synced = t.store.get_required(&synced).unwrap();
    let before_created = t.store.get_required(&created).unwrap();

    let t = t.reopen();
    assert_eq!(t.store.get_required(&synced).unwrap(), before_synced);
    let after_created = t.store.get_required(&created).unwrap();
    assert_eq!(after_created, before_created);
    assert!(after_created.sync_in_flight);
    assert_eq!(t.store.pending_operations(None, None).unwrap(), before_pending);
    assert_eq!(t.store.account_namespaces(), vec![account("alice")]);
}

#[test]
fn removed_rows_stay_removed() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("user", "alice", "gone");

    t.store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), None)
        .unwrap();
    t.store.delete(&key).unwrap();

    let t = t.reopen();
    assert!(t.store.get(&key).unwrap().is_none());
    assert_eq!(t.store.stats().rows, 0);
}

#[test]
fn buffered_writes_survive_clean_close() {
    let t = TestStore::with_config(test_config().with_durability("buffered"));
    for i in 0..50 {
        t.store
            .upsert(&shared_key("readonly", &format!("doc{}", i)), doc(serde_json::json!({ "i": i })), None, None)
            .unwrap();
    }
    t.store.close().unwrap();

    let t = t.reopen();
    assert_eq!(t.store.list(&PartitionName::readonly(), None).unwrap().len(), 50);
}

#[test]
fn compaction_keeps_live_rows_only() {
    let t = TestStore::new();
    let key = shared_key("readonly", "hot");
    for i in 0..40 {
        t.store
            .upsert(&key, doc(serde_json::json!({ "i": i })), None, None)
            .unwrap();
    }
    let other = shared_key("readonly", "cold");
    t.store.upsert(&other, doc(serde_json::json!({})), None, None).unwrap();
    t.store.delete(&other).unwrap();

    t.store.compact().unwrap();
    let stats = t.store.stats();
    assert_eq!(stats.rows, 2);
    assert_eq!(stats.log_frames, 2);

    let t = t.reopen();
    assert_eq!(body(&t.store.get_required(&key).unwrap()), serde_json::json!({"i": 39}));
    assert_eq!(t.store.stats().pending, 1);
}

#[test]
fn open_reads_persisted_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    {
        let store = DocumentStore::open_with_config(
            dir.path(),
            test_config().with_durability("buffered").with_default_ttl_secs(120),
        )
        .unwrap();
        store.close().unwrap();
    }

    let store = DocumentStore::open(dir.path()).unwrap();
    assert_eq!(store.config().durability, "buffered");
    assert_eq!(store.config().default_ttl_secs, 120);
    assert_eq!(store.config().sweep_interval_ms, 0);
}

#[test]
fn open_writes_default_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    assert_eq!(store.config(), &StoreConfig::default());
    assert!(dir.path().join(doccache::CONFIG_FILE_NAME).exists());
    assert!(dir.path().join("MANIFEST").exists());
    assert!(dir.path().join("default").join("documents.log").exists());
}
