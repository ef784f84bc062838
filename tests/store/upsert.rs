//! Upsert semantics: replace-on-write, markers and time-to-live options.

use crate::common::*;
use proptest::prelude::*;
use std::time::Duration;

#[test]
fn upsert_then_get_returns_payload_and_marker() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("Reports", "alice", "doc1");

    let outcome = t
        .store
        .upsert(&key, doc(serde_json::json!({"x": 1})), Some(PendingOperation::Create), ttl(3600))
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    let record = t.store.get(&key).unwrap().unwrap();
    assert_eq!(body(&record), serde_json::json!({"x": 1}));
    assert_eq!(record.pending_operation, PendingOperation::Create);
    assert_eq!(record.last_modified, START);
}

#[test]
fn upsert_same_key_twice_keeps_one_record() {
    let t = TestStore::new();
    let key = shared_key("readonly", "config");
    let payload = serde_json::json!({"theme": "dark"});

    assert_eq!(
        t.store.upsert(&key, doc(payload.clone()), None, None).unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        t.store.upsert(&key, doc(payload.clone()), None, None).unwrap(),
        UpsertOutcome::Replaced
    );

    let listed = t.store.list(&PartitionName::readonly(), None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(body(&listed[0]), payload);
}

#[test]
fn upsert_replaces_instead_of_merging() {
    let t = TestStore::new();
    let key = shared_key("settings", "profile");

    t.store
        .upsert(
            &key,
            doc(serde_json::json!({"a": 1, "b": 2})).with_etag("v1"),
            None,
            None,
        )
        .unwrap();
    t.store
        .upsert(&key, doc(serde_json::json!({"c": 3})), None, None)
        .unwrap();

    let record = t.store.get_required(&key).unwrap();
    assert_eq!(body(&record), serde_json::json!({"c": 3}));
    assert_eq!(record.document.etag, None);
}

#[test]
fn upsert_without_marker_clears_previous_marker() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("user", "alice", "note");

    t.store
        .upsert(&key, doc(serde_json::json!({"v": 1})), Some(PendingOperation::Replace), None)
        .unwrap();
    t.store
        .upsert(&key, doc(serde_json::json!({"v": 2})), None, None)
        .unwrap();

    let record = t.store.get_required(&key).unwrap();
    assert_eq!(record.pending_operation, PendingOperation::None);
    assert!(t.store.pending_operations(None, None).unwrap().is_empty());
}

#[test]
fn upsert_rejects_delete_marker() {
    let t = TestStore::new();
    let key = shared_key("readonly", "doc");

    let err = t
        .store
        .upsert(&key, doc(serde_json::json!({})), Some(PendingOperation::Delete), None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::UnsupportedMarker(PendingOperation::Delete))
    ));
    assert!(t.store.get(&key).unwrap().is_none());
}

#[test]
fn upsert_rejects_invalid_body() {
    let t = TestStore::new();
    let key = shared_key("readonly", "doc");

    let missing = DocumentWrapper::default();
    let err = t.store.upsert(&key, missing, None, None).unwrap_err();
    assert!(err.is_validation());

    let broken = DocumentWrapper {
        json: Some("{not json".to_string()),
        ..DocumentWrapper::default()
    };
    let err = t.store.upsert(&key, broken, None, None).unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::InvalidDocument(_))));
    assert_eq!(t.store.stats().rows, 0);
}

#[test]
fn no_cache_evicts_existing_row() {
    let t = TestStore::new();
    let key = shared_key("readonly", "feed");

    t.store
        .upsert(&key, doc(serde_json::json!({"v": 1})), None, None)
        .unwrap();
    let outcome = t
        .store
        .upsert(&key, doc(serde_json::json!({"v": 2})), None, Some(WriteOptions::no_cache()))
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::NotCached);
    assert!(t.store.get(&key).unwrap().is_none());
    assert_eq!(t.store.stats().rows, 0);
}

#[test]
fn no_cache_keeps_rows_awaiting_sync() {
    let t = TestStore::new();
    t.sign_in("alice");
    let deleted = account_key("user", "alice", "deleted");
    let edited = account_key("user", "alice", "edited");

    t.store
        .upsert(&deleted, doc(serde_json::json!({"v": 1})), None, None)
        .unwrap();
    assert_eq!(t.store.delete(&deleted).unwrap(), DeleteOutcome::Tombstoned);
    t.store
        .upsert(&edited, doc(serde_json::json!({"v": 1})), Some(PendingOperation::Replace), None)
        .unwrap();

    for key in [&deleted, &edited] {
        let outcome = t
            .store
            .upsert(key, doc(serde_json::json!({"v": 2})), None, Some(WriteOptions::no_cache()))
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::NotCached);
    }

    let pending: Vec<(DocumentKey, PendingOperation)> = t
        .store
        .pending_operations(None, None)
        .unwrap()
        .into_iter()
        .map(|p| (p.record.key(), p.record.pending_operation))
        .collect();
    assert_eq!(
        pending,
        vec![
            (deleted.clone(), PendingOperation::Delete),
            (edited.clone(), PendingOperation::Replace),
        ]
    );
    assert_eq!(body(&t.store.get_required(&edited).unwrap()), serde_json::json!({"v": 1}));
}

#[test]
fn no_cache_with_pending_marker_is_rejected() {
    let t = TestStore::new();
    t.sign_in("alice");
    let key = account_key("user", "alice", "draft");

    let err = t
        .store
        .upsert(
            &key,
            doc(serde_json::json!({})),
            Some(PendingOperation::Create),
            Some(WriteOptions::no_cache()),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::PendingWriteNotCached(PendingOperation::Create))
    ));
}

#[test]
fn missing_options_use_configured_default_ttl() {
    let t = TestStore::with_config(test_config().with_default_ttl_secs(60));
    let key = shared_key("readonly", "short");

    t.store
        .upsert(&key, doc(serde_json::json!({})), None, None)
        .unwrap();
    t.advance(Duration::from_secs(59));
    assert!(t.store.get(&key).unwrap().is_some());
    t.advance(Duration::from_secs(1));
    assert!(t.store.get(&key).unwrap().is_none());
}

#[test]
fn zero_default_ttl_means_no_expiry() {
    let t = TestStore::with_config(test_config().with_default_ttl_secs(0));
    let key = shared_key("readonly", "forever");

    t.store
        .upsert(&key, doc(serde_json::json!({})), None, None)
        .unwrap();
    t.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    assert!(t.store.get(&key).unwrap().is_some());
}

#[test]
fn get_required_reports_missing_key() {
    let t = TestStore::new();
    let key = shared_key("readonly", "absent");

    let err = t.store.get_required(&key).unwrap_err();
    assert!(matches!(err, Error::NotFound(k) if k == key));
}

fn marker_strategy() -> impl Strategy<Value = Option<PendingOperation>> {
    prop_oneof![
        Just(None),
        Just(Some(PendingOperation::None)),
        Just(Some(PendingOperation::Create)),
        Just(Some(PendingOperation::Replace)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn upsert_read_returns_what_was_written(
        partition in "[A-Za-z][A-Za-z0-9_]{0,15}",
        document_id in "[a-z0-9][a-z0-9-]{0,31}",
        value in any::<i64>(),
        text in "[ -~]{0,40}",
        marker in marker_strategy(),
    ) {
        let t = TestStore::with_config(test_config().with_durability("buffered"));
        t.sign_in("alice");
        let account_id = if partition == PartitionName::READONLY { None } else { Some("alice") };
        let key = DocumentKey::parse(&partition, account_id, &document_id).unwrap();
        let payload = serde_json::json!({ "value": value, "text": text });

        t.store.upsert(&key, doc(payload.clone()), marker, None).unwrap();

        let record = t.store.get_required(&key).unwrap();
        prop_assert_eq!(body(&record), payload);
        prop_assert_eq!(record.pending_operation, marker.unwrap_or_default());
        prop_assert_eq!(record.key(), key);
    }
}
