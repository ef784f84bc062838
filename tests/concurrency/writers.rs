//! Same-key writers and readers racing them.

use crate::common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;

const WRITERS: usize = 8;
const WRITES_PER_THREAD: usize = 50;

fn consistent_doc(writer: usize, seq: usize) -> DocumentWrapper {
    let tag = format!("w{}-s{}", writer, seq);
    doc(serde_json::json!({ "writer": writer, "seq": seq, "a": tag, "b": tag }))
}

fn assert_consistent(record: &DocumentRecord) {
    let value = body(record);
    assert_eq!(value["a"], value["b"], "torn record: {}", value);
    assert_eq!(
        value["a"],
        serde_json::json!(format!("w{}-s{}", value["writer"], value["seq"]))
    );
}

#[test]
fn concurrent_upserts_to_one_key_leave_one_final_value() {
    let t = TestStore::with_config(test_config().with_durability("buffered"));
    let key = shared_key("readonly", "contended");
    let barrier = Barrier::new(WRITERS);

    thread::scope(|s| {
        for writer in 0..WRITERS {
            let (store, key, barrier) = (&t.store, &key, &barrier);
            s.spawn(move || {
                barrier.wait();
                for seq in 0..WRITES_PER_THREAD {
                    store.upsert(key, consistent_doc(writer, seq), None, None).unwrap();
                }
            });
        }
    });

    let listed = t.store.list(&PartitionName::readonly(), None).unwrap();
    assert_eq!(listed.len(), 1);
    let final_value = listed[0].clone();
    assert_consistent(&final_value);
    // Every writer finished its own sequence, so the winner wrote its last value.
    assert_eq!(body(&final_value)["seq"], serde_json::json!(WRITES_PER_THREAD - 1));

    t.store.close().unwrap();
    let t = t.reopen();
    assert_eq!(t.store.get_required(&key).unwrap(), final_value);
}

#[test]
fn readers_never_observe_torn_records() {
    let t = TestStore::with_config(test_config().with_durability("buffered"));
    let key = shared_key("readonly", "hot");
    t.store.upsert(&key, consistent_doc(0, 0), None, None).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for writer in 1..=2 {
            let (store, key, done) = (&t.store, &key, &done);
            s.spawn(move || {
                for seq in 0..200 {
                    store.upsert(key, consistent_doc(writer, seq), None, None).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });
        }
        for _ in 0..4 {
            let (store, key, done) = (&t.store, &key, &done);
            s.spawn(move || {
                let mut reads = 0usize;
                while !done.load(Ordering::SeqCst) || reads < 10 {
                    let record = store.get_required(key).unwrap();
                    assert_consistent(&record);
                    reads += 1;
                }
            });
        }
    });
}

#[test]
fn racing_delete_and_upsert_leave_a_valid_state() {
    let t = TestStore::with_config(test_config().with_durability("buffered"));
    t.sign_in("alice");
    let key = account_key("user", "alice", "flip");

    thread::scope(|s| {
        let (store, key) = (&t.store, &key);
        s.spawn(move || {
            for seq in 0..100 {
                store
                    .upsert(key, consistent_doc(1, seq), Some(PendingOperation::Replace), None)
                    .unwrap();
            }
        });
        s.spawn(move || {
            for _ in 0..100 {
                store.delete(key).unwrap();
            }
        });
    });

    let stats = t.store.stats();
    assert!(stats.rows <= 1);
    let pending = t.store.pending_operations(None, None).unwrap();
    assert!(pending.len() <= 1);
    match t.store.get(&key).unwrap() {
        Some(record) => {
            assert_eq!(record.pending_operation, PendingOperation::Replace);
            assert_consistent(&record);
        }
        None => {
            // Deleted last: a tombstone awaits sync.
            assert_eq!(pending[0].record.pending_operation, PendingOperation::Delete);
        }
    }
}

#[test]
fn sync_client_drains_while_app_writes() {
    let t = TestStore::with_config(test_config().with_durability("buffered"));
    t.sign_in("alice");

    thread::scope(|s| {
        let store = &t.store;
        s.spawn(move || {
            for i in 0..200 {
                store
                    .upsert(
                        &account_key("user", "alice", &format!("doc{}", i)),
                        doc(serde_json::json!({ "i": i })),
                        Some(PendingOperation::Create),
                        None,
                    )
                    .unwrap();
            }
        });
        s.spawn(move || {
            for _ in 0..50 {
                for p in store.pending_operations(None, None).unwrap() {
                    let key = p.record.key();
                    if store.mark_in_flight(&key).unwrap() {
                        let outcome = store.confirm_synced(&key, p.record.pending_operation).unwrap();
                        assert_eq!(outcome, ConfirmOutcome::Cleared);
                    }
                }
            }
        });
    });

    // Whatever the drainer missed is still pending; nothing was lost.
    let listed = t.store.list(&PartitionName::user(), Some(&account("alice"))).unwrap();
    assert_eq!(listed.len(), 200);
    let pending = t.store.pending_operations(None, None).unwrap().len();
    let synced = listed
        .iter()
        .filter(|r| r.pending_operation == PendingOperation::None)
        .count();
    assert_eq!(pending + synced, 200);
}
