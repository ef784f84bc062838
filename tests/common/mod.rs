//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

pub use doccache::{
    AccountId, AccountIdContext, ConfirmOutcome, DeleteOutcome, DocumentKey, DocumentRecord,
    DocumentStore, DocumentWrapper, Error, IdentityProvider, ManualClock, NamespaceId,
    PartitionName, PendingOperation, SchemaError, StoreConfig, Timestamp, UpsertOutcome,
    ValidationError, WriteOptions,
};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown for failing tests).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Start of the manual clock used by every suite
pub const START: Timestamp = Timestamp::from_secs(1_700_000_000);

/// Config for tests: fsync every write, no background sweeper.
pub fn test_config() -> StoreConfig {
    StoreConfig::default()
        .with_durability("always")
        .with_sweep_interval(Duration::ZERO)
}

// ============================================================================
// TestStore - store + clock + identity in a temp directory
// ============================================================================

/// A store in a temporary directory, driven by a manual clock and an
/// in-memory identity context.
pub struct TestStore {
    pub store: DocumentStore,
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub identity: Arc<AccountIdContext>,
    config: StoreConfig,
}

impl TestStore {
    /// Fresh store with the test config.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Fresh store with a specific config.
    pub fn with_config(config: StoreConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let clock = Arc::new(ManualClock::new(START));
        let identity = Arc::new(AccountIdContext::init(clock.clone()));
        let store = open_store(dir.path(), &config, &identity, &clock);
        TestStore {
            store,
            dir,
            clock,
            identity,
            config,
        }
    }

    /// Drop the store and open it again from disk with the same clock and identity.
    pub fn reopen(self) -> Self {
        let TestStore {
            store,
            dir,
            clock,
            identity,
            config,
        } = self;
        drop(store);
        let store = open_store(dir.path(), &config, &identity, &clock);
        TestStore {
            store,
            dir,
            clock,
            identity,
            config,
        }
    }

    /// Record `id` as the signed-in account.
    pub fn sign_in(&self, id: &str) {
        self.identity
            .set_account_id(Some(account(id)))
            .expect("Failed to set account");
    }

    /// Record a sign-out.
    pub fn sign_out(&self) {
        self.identity.set_account_id(None).expect("Failed to clear account");
    }

    /// Advance the manual clock.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn open_store(
    path: &Path,
    config: &StoreConfig,
    identity: &Arc<AccountIdContext>,
    clock: &Arc<ManualClock>,
) -> DocumentStore {
    DocumentStore::open_with(path, config.clone(), identity.clone(), clock.clone())
        .expect("Failed to open test store")
}

// ============================================================================
// Keys and documents
// ============================================================================

pub fn account(id: &str) -> AccountId {
    AccountId::new(id).expect("valid account id")
}

/// Key in an account-scoped partition.
pub fn account_key(partition: &str, account_id: &str, document_id: &str) -> DocumentKey {
    DocumentKey::parse(partition, Some(account_id), document_id).expect("valid key")
}

/// Key in an account-agnostic partition.
pub fn shared_key(partition: &str, document_id: &str) -> DocumentKey {
    DocumentKey::parse(partition, None, document_id).expect("valid key")
}

pub fn doc(value: serde_json::Value) -> DocumentWrapper {
    DocumentWrapper::from_value(&value)
}

/// Body of a record as JSON.
pub fn body(record: &DocumentRecord) -> serde_json::Value {
    record
        .document
        .to_value()
        .expect("stored body is JSON")
        .expect("record has a body")
}

pub fn ttl(secs: u64) -> Option<WriteOptions> {
    Some(WriteOptions::with_ttl(Duration::from_secs(secs)))
}

pub const HOUR: Duration = Duration::from_secs(3600);
