//! Lazy expiration on read and eager sweeps.

use crate::common::*;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn expired_row_is_unreadable_before_sweep() {
    let t = TestStore::new();
    let key = shared_key("readonly", "news");

    t.store
        .upsert(&key, doc(serde_json::json!({"headline": "x"})), None, ttl(60))
        .unwrap();
    t.advance(Duration::from_secs(61));

    assert!(t.store.get(&key).unwrap().is_none());
    assert!(t.store.list(&PartitionName::readonly(), None).unwrap().is_empty());
    // Still physically present until a sweep runs.
    assert_eq!(t.store.stats().rows, 1);
}

#[test]
fn sweep_removes_expired_synced_rows_only() {
    let t = TestStore::new();
    let fresh = shared_key("readonly", "fresh");
    let stale = shared_key("readonly", "stale");
    let forever = shared_key("readonly", "forever");

    t.store.upsert(&fresh, doc(serde_json::json!({})), None, ttl(7200)).unwrap();
    t.store.upsert(&stale, doc(serde_json::json!({})), None, ttl(60)).unwrap();
    t.store
        .upsert(&forever, doc(serde_json::json!({})), None, Some(WriteOptions::no_expiry()))
        .unwrap();
    t.advance(HOUR);

    assert_eq!(t.store.sweep_expired().unwrap(), 1);
    assert_eq!(t.store.stats().rows, 2);
    assert!(t.store.get(&fresh).unwrap().is_some());
    assert!(t.store.get(&forever).unwrap().is_some());
    assert_eq!(t.store.sweep_expired().unwrap(), 0);
}

#[test]
fn sweep_keeps_expired_pending_tombstone() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("user", "alice", "old");

    t.store.upsert(&key, doc(serde_json::json!({})), None, ttl(60)).unwrap();
    assert_eq!(t.store.delete(&key).unwrap(), DeleteOutcome::Tombstoned);
    t.advance(HOUR);

    assert_eq!(t.store.sweep_expired().unwrap(), 0);
    let pending = t.store.pending_operations(None, None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.pending_operation, PendingOperation::Delete);

    // Once the remote confirms, the tombstone goes away.
    assert!(t.store.mark_in_flight(&key).unwrap());
    assert_eq!(
        t.store.confirm_synced(&key, PendingOperation::Delete).unwrap(),
        ConfirmOutcome::Removed
    );
    assert_eq!(t.store.stats().rows, 0);
}

#[test]
fn sweep_keeps_expired_pending_create() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("user", "alice", "draft");

    t.store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Create), ttl(60))
        .unwrap();
    t.advance(HOUR);

    assert!(t.store.get(&key).unwrap().is_none());
    assert_eq!(t.store.sweep_expired().unwrap(), 0);
    assert_eq!(t.store.pending_operations(None, None).unwrap().len(), 1);
}

#[test]
fn background_sweeper_reclaims_expired_rows() {
    let t = TestStore::with_config(test_config().with_sweep_interval(Duration::from_millis(20)));
    let key = shared_key("readonly", "ephemeral");

    t.store.upsert(&key, doc(serde_json::json!({})), None, ttl(1)).unwrap();
    t.advance(Duration::from_secs(5));

    let deadline = Instant::now() + Duration::from_secs(5);
    while t.store.stats().rows > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(t.store.stats().rows, 0);
}

#[test]
fn sweep_interval_zero_disables_background_sweeps() {
    let t = TestStore::new();
    let key = shared_key("readonly", "ephemeral");

    t.store.upsert(&key, doc(serde_json::json!({})), None, ttl(1)).unwrap();
    t.advance(Duration::from_secs(5));
    thread::sleep(Duration::from_millis(150));

    assert_eq!(t.store.stats().rows, 1);
}
