//! Document store: open/close logic and document operations
//!
//! [`DocumentStore`] orchestrates:
//! - configuration (`doccache.toml`)
//! - layout validation and migration ([`SchemaManager`])
//! - the namespace arena (one [`DocumentTable`] per namespace)
//! - the background TTL sweeper
//!
//! ## Routing
//!
//! Documents without an account live in the default namespace; documents of
//! an account live in that account's namespace. The `"user"` partition is
//! always account-scoped and the `"readonly"` partition never is.
//!
//! ## Sync boundary
//!
//! A sync client drains [`DocumentStore::pending_operations`], calls
//! [`DocumentStore::mark_in_flight`] before pushing a change and
//! [`DocumentStore::confirm_synced`] once the remote store acknowledged it.
//!
//! [`DocumentTable`]: doccache_storage::DocumentTable

use crate::arena::NamespaceArena;
use crate::config::{StoreConfig, CONFIG_FILE_NAME};
use crate::sweeper::{Sweep, TtlSweeper};
use doccache_core::{
    AccountId, Clock, DocumentKey, DocumentRecord, DocumentWrapper, Error, IdentityProvider,
    NamespaceId, PartitionName, PendingOperation, Result, SchemaError, SystemClock, Timestamp,
    ValidationError, WriteOptions,
};
use doccache_storage::{Mutation, RowKey, SchemaManager};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the key
    Inserted,
    /// An existing row (live, expired or tombstone) was fully replaced
    Replaced,
    /// The no-cache time-to-live was requested; a cached row in sync was evicted
    NotCached,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The key did not exist; nothing was written
    NotFound,
    /// A local create the remote never saw was dropped outright
    Removed,
    /// The row became a tombstone awaiting sync confirmation
    Tombstoned,
    /// The row already was a tombstone
    AlreadyTombstoned,
}

/// Result of a sync confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Pending marker cleared; the row is now in sync
    Cleared,
    /// Confirmed tombstone physically removed
    Removed,
    /// A newer local change replaced the one confirmed; the row stays pending
    Superseded,
    /// No row for the key
    NotFound,
}

/// A record awaiting sync, with the account that was signed in when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    /// The pending record
    pub record: DocumentRecord,
    /// Account signed in at `record.last_modified`, per the identity provider
    pub written_by: Option<AccountId>,
}

/// Store-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Provisioned account namespaces
    pub account_namespaces: usize,
    /// Physical rows across all namespaces
    pub rows: usize,
    /// Rows with a pending operation
    pub pending: usize,
    /// Log frames across all namespaces
    pub log_frames: u64,
    /// Log bytes across all namespaces
    pub log_bytes: u64,
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Shared state, also referenced by the sweep thread.
pub(crate) struct StoreInner {
    pub(crate) path: PathBuf,
    pub(crate) config: StoreConfig,
    pub(crate) arena: NamespaceArena,
    pub(crate) identity: Option<Arc<dyn IdentityProvider>>,
    pub(crate) clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

/// Offline-first document cache.
///
/// `DocumentStore` is `Send + Sync`; share it behind an `Arc`. All
/// operations block until their write is durable (per the configured
/// durability) or has failed without effect.
///
/// # Example
///
/// ```text
/// use doccache::{DocumentStore, DocumentKey, DocumentWrapper, PendingOperation};
///
/// let store = DocumentStore::open("/data/cache")?;
/// let key = DocumentKey::parse("user", Some("alice"), "doc1")?;
/// store.upsert(&key, DocumentWrapper::from_json(r#"{"x":1}"#)?, Some(PendingOperation::Create), None)?;
/// ```
pub struct DocumentStore {
    pub(crate) inner: Arc<StoreInner>,
    sweeper: Option<TtlSweeper>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.inner.path)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Open the store at `path`.
    ///
    /// Reads `doccache.toml` from the directory, writing the default file
    /// first if there is none. Uses the system clock and no identity
    /// provider (account scoping is not checked against a signed-in user).
    ///
    /// # Flow
    ///
    /// 1. Create the directory if needed
    /// 2. Read or create `doccache.toml`
    /// 3. Open the layout, migrating an older one
    /// 4. Replay every namespace log
    /// 5. Start the TTL sweeper
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| Error::io("creating store directory", e))?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let config = StoreConfig::from_file(&config_path)?;

        Self::open_inner(data_dir, config, None, Arc::new(SystemClock))
    }

    /// Open the store with an explicit configuration.
    ///
    /// The configuration is written to `doccache.toml` so later
    /// [`open`](Self::open) calls pick up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        Self::open_with_parts(path.as_ref(), config, None, Arc::new(SystemClock))
    }

    /// Open the store with an identity provider and a clock.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        config: StoreConfig,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::open_with_parts(path.as_ref(), config, Some(identity), clock)
    }

    pub(crate) fn open_with_parts(
        path: &Path,
        config: StoreConfig,
        identity: Option<Arc<dyn IdentityProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(path).map_err(|e| Error::io("creating store directory", e))?;
        config.write_to_file(&path.join(CONFIG_FILE_NAME))?;
        Self::open_inner(path, config, identity, clock)
    }

    fn open_inner(
        path: &Path,
        config: StoreConfig,
        identity: Option<Arc<dyn IdentityProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let durability = config.durability_mode()?;
        let schema = SchemaManager::open(path, durability)?;
        let arena = NamespaceArena::load(schema, config.compaction_ratio)?;

        let inner = Arc::new(StoreInner {
            path: path.to_path_buf(),
            config,
            arena,
            identity,
            clock,
            closed: AtomicBool::new(false),
        });

        let sweeper = match inner.config.sweep_interval() {
            Some(interval) => {
                let target: Arc<dyn Sweep> = Arc::clone(&inner) as Arc<dyn Sweep>;
                Some(TtlSweeper::start(target, interval)?)
            }
            None => None,
        };

        info!(
            target: "doccache::store",
            path = ?path,
            durability = ?durability,
            account_namespaces = inner.arena.accounts().len(),
            sweeper = sweeper.is_some(),
            "Opened document store"
        );
        Ok(Self { inner, sweeper })
    }

    /// Store directory
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.inner.ensure_open()
    }

    // ------------------------------------------------------------------------
    // Document operations
    // ------------------------------------------------------------------------

    /// Insert or fully replace the document at `key`.
    ///
    /// - `marker`: pending operation to record; `None` marks the row as in
    ///   sync (any earlier marker is overwritten). `Delete` is rejected, use
    ///   [`delete`](Self::delete).
    /// - `options`: device time-to-live; `None` applies the configured
    ///   default. The expiration is computed from the write's timestamp.
    ///
    /// A no-cache time-to-live stores nothing and evicts a cached row that is
    /// in sync (rows awaiting sync are kept); it cannot be combined with a
    /// pending marker. A pending write to an
    /// account namespace requires that account to be signed in.
    pub fn upsert(
        &self,
        key: &DocumentKey,
        document: DocumentWrapper,
        marker: Option<PendingOperation>,
        options: Option<WriteOptions>,
    ) -> Result<UpsertOutcome> {
        self.ensure_open()?;
        validate_scope(&key.partition, key.account_id.as_ref())?;
        document.validate()?;

        let operation = marker.unwrap_or_default();
        if operation == PendingOperation::Delete {
            return Err(ValidationError::UnsupportedMarker(operation).into());
        }

        let ttl = options
            .map(|o| o.device_time_to_live)
            .unwrap_or_else(|| self.inner.config.default_time_to_live());
        let namespace = key.namespace();
        let row = row_key(key);
        let now = self.inner.clock.now();

        let Some(expiration) = ttl.expiration_from(now) else {
            if operation.is_pending() {
                return Err(ValidationError::PendingWriteNotCached(operation).into());
            }
            // Rows awaiting sync stay until the sync client confirms them.
            self.inner.arena.with_table(&namespace, |table| match table {
                Some(table) => table.update(&row, |current| match current {
                    Some(record) if !record.pending_operation.is_pending() => {
                        (Mutation::Remove, ())
                    }
                    _ => (Mutation::Keep, ()),
                }),
                None => Ok(()),
            })?;
            debug!(target: "doccache::store", key = %key, "Upsert not cached");
            return Ok(UpsertOutcome::NotCached);
        };

        if operation.is_pending() {
            self.inner.check_current_account(key.account_id.as_ref())?;
        }
        self.ensure_namespace(&namespace)?;

        let record = DocumentRecord {
            partition: key.partition.clone(),
            account_id: key.account_id.clone(),
            document_id: key.document_id.clone(),
            document,
            expiration,
            pending_operation: operation,
            sync_in_flight: false,
            last_modified: now,
        };
        let previous = self
            .inner
            .arena
            .with_existing(&namespace, |table| table.put(record))?;

        debug!(target: "doccache::store", key = %key, operation = %operation, "Upserted document");
        Ok(match previous {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        })
    }

    fn ensure_namespace(&self, namespace: &NamespaceId) -> Result<()> {
        let NamespaceId::Account(account) = namespace else {
            return Ok(());
        };
        if self.inner.arena.is_ready(namespace) {
            return Ok(());
        }
        if !self.inner.config.auto_create_namespaces {
            return Err(SchemaError::NamespaceNotReady {
                namespace: namespace.to_string(),
            }
            .into());
        }
        self.inner.arena.create(account)?;
        Ok(())
    }

    /// Delete the document at `key`.
    ///
    /// A pending create that no sync client has started pushing is dropped
    /// outright. Any other row becomes a tombstone: body cleared, entity tag
    /// kept, pending `Delete` until [`confirm_synced`](Self::confirm_synced).
    /// Deleting a missing key, or an expired row already in sync, succeeds
    /// without writing anything.
    pub fn delete(&self, key: &DocumentKey) -> Result<DeleteOutcome> {
        self.ensure_open()?;
        validate_scope(&key.partition, key.account_id.as_ref())?;
        self.inner.check_current_account(key.account_id.as_ref())?;

        let row = row_key(key);
        let now = self.inner.clock.now();
        let outcome = self.inner.arena.with_table(&key.namespace(), |table| {
            let Some(table) = table else {
                return Ok(DeleteOutcome::NotFound);
            };
            table.update(&row, |current| match current {
                None => (Mutation::Keep, DeleteOutcome::NotFound),
                // Expired and already in sync: nothing the remote needs to hear about.
                Some(record)
                    if record.is_expired_at(now) && !record.pending_operation.is_pending() =>
                {
                    (Mutation::Keep, DeleteOutcome::NotFound)
                }
                Some(record) => match record.pending_operation {
                    PendingOperation::Delete => (Mutation::Keep, DeleteOutcome::AlreadyTombstoned),
                    PendingOperation::Create if !record.sync_in_flight => {
                        (Mutation::Remove, DeleteOutcome::Removed)
                    }
                    PendingOperation::Create
                    | PendingOperation::Replace
                    | PendingOperation::None => {
                        (Mutation::Put(tombstone(record, now)), DeleteOutcome::Tombstoned)
                    }
                },
            })
        })?;

        debug!(target: "doccache::store", key = %key, outcome = ?outcome, "Deleted document");
        Ok(outcome)
    }

    /// Read the document at `key`.
    ///
    /// Expired rows and tombstones read as absent, whether or not a sweep
    /// has removed them yet.
    pub fn get(&self, key: &DocumentKey) -> Result<Option<DocumentRecord>> {
        self.ensure_open()?;
        validate_scope(&key.partition, key.account_id.as_ref())?;
        let row = row_key(key);
        let now = self.inner.clock.now();
        self.inner.arena.with_table(&key.namespace(), |table| {
            Ok(table
                .and_then(|t| t.get(&row))
                .filter(|record| record.is_visible_at(now)))
        })
    }

    /// Read the document at `key`, failing with [`Error::NotFound`] if absent.
    pub fn get_required(&self, key: &DocumentKey) -> Result<DocumentRecord> {
        self.get(key)?.ok_or_else(|| Error::NotFound(key.clone()))
    }

    /// Readable documents of one partition, sorted by document id.
    pub fn list(
        &self,
        partition: &PartitionName,
        account_id: Option<&AccountId>,
    ) -> Result<Vec<DocumentRecord>> {
        self.ensure_open()?;
        validate_scope(partition, account_id)?;
        let now = self.inner.clock.now();
        let namespace = NamespaceId::for_account(account_id);
        let mut records = self.inner.arena.with_table(&namespace, |table| {
            Ok(table
                .map(|t| t.scan(|r| r.partition == *partition && r.is_visible_at(now)))
                .unwrap_or_default())
        })?;
        records.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Sync boundary
    // ------------------------------------------------------------------------

    /// Records awaiting sync, oldest write first.
    ///
    /// `namespace: None` covers every namespace; `partition: None` every
    /// partition. Tombstones and expired rows are included.
    pub fn pending_operations(
        &self,
        namespace: Option<&NamespaceId>,
        partition: Option<&PartitionName>,
    ) -> Result<Vec<PendingRecord>> {
        self.ensure_open()?;
        let records = match namespace {
            Some(ns) => self
                .inner
                .arena
                .with_table(ns, |t| Ok(t.map(|t| t.pending()).unwrap_or_default()))?,
            None => self
                .inner
                .arena
                .tables()
                .iter()
                .flat_map(|t| t.pending())
                .collect(),
        };

        let mut pending: Vec<PendingRecord> = records
            .into_iter()
            .filter(|r| partition.map_or(true, |p| r.partition == *p))
            .map(|record| PendingRecord {
                written_by: self
                    .inner
                    .identity
                    .as_ref()
                    .and_then(|id| id.account_id_at(record.last_modified)),
                record,
            })
            .collect();
        pending.sort_by(|a, b| {
            a.record
                .last_modified
                .cmp(&b.record.last_modified)
                .then_with(|| a.record.key().cmp(&b.record.key()))
        });
        Ok(pending)
    }

    /// Note that a sync client started pushing the pending change at `key`.
    ///
    /// Returns `false` if there is no pending row or it is already in flight.
    pub fn mark_in_flight(&self, key: &DocumentKey) -> Result<bool> {
        self.ensure_open()?;
        let row = row_key(key);
        self.inner.arena.with_table(&key.namespace(), |table| {
            let Some(table) = table else {
                return Ok(false);
            };
            table.update(&row, |current| match current {
                Some(record) if record.pending_operation.is_pending() && !record.sync_in_flight => {
                    let mut marked = record.clone();
                    marked.sync_in_flight = true;
                    (Mutation::Put(marked), true)
                }
                _ => (Mutation::Keep, false),
            })
        })
    }

    /// Record that the remote store acknowledged `operation` for `key`.
    ///
    /// A confirmed create/replace clears the marker; a confirmed delete
    /// removes the tombstone. Only a change marked in flight can be
    /// confirmed: if a later local write replaced it, the row is left
    /// pending and `Superseded` is returned.
    pub fn confirm_synced(
        &self,
        key: &DocumentKey,
        operation: PendingOperation,
    ) -> Result<ConfirmOutcome> {
        self.ensure_open()?;
        if !operation.is_pending() {
            return Err(ValidationError::UnsupportedMarker(operation).into());
        }
        let row = row_key(key);
        let outcome = self.inner.arena.with_table(&key.namespace(), |table| {
            let Some(table) = table else {
                return Ok(ConfirmOutcome::NotFound);
            };
            table.update(&row, |current| match current {
                None => (Mutation::Keep, ConfirmOutcome::NotFound),
                Some(record)
                    if record.pending_operation != operation || !record.sync_in_flight =>
                {
                    (Mutation::Keep, ConfirmOutcome::Superseded)
                }
                Some(record) => match operation {
                    PendingOperation::Delete => (Mutation::Remove, ConfirmOutcome::Removed),
                    PendingOperation::Create | PendingOperation::Replace | PendingOperation::None => {
                        let mut synced = record.clone();
                        synced.pending_operation = PendingOperation::None;
                        synced.sync_in_flight = false;
                        (Mutation::Put(synced), ConfirmOutcome::Cleared)
                    }
                },
            })
        })?;
        debug!(target: "doccache::store", key = %key, operation = %operation, outcome = ?outcome, "Confirmed sync");
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Physically remove expired rows without a pending operation.
    pub fn sweep_expired(&self) -> Result<usize> {
        self.inner.sweep_expired()
    }

    /// Rewrite every namespace log with only its live rows.
    pub fn compact(&self) -> Result<()> {
        self.ensure_open()?;
        for table in self.inner.arena.tables() {
            if table.is_destroyed() {
                continue;
            }
            table.compact()?;
        }
        Ok(())
    }

    /// Row and log counters across all namespaces.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            account_namespaces: self.inner.arena.accounts().len(),
            ..StoreStats::default()
        };
        for table in self.inner.arena.tables() {
            let t = table.stats();
            stats.rows += t.rows;
            stats.pending += t.pending;
            stats.log_frames += t.log_frames;
            stats.log_bytes += t.log_bytes;
        }
        stats
    }

    /// Stop the sweeper and flush every log; later calls fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(sweeper) = &self.sweeper {
            sweeper.stop();
        }
        self.inner.sync_all()?;
        info!(target: "doccache::store", path = ?self.inner.path, "Closed document store");
        Ok(())
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.inner.sync_all() {
                warn!(target: "doccache::store", error = %e, "Failed to flush logs on drop");
            }
        }
    }
}

impl StoreInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Reject local changes to an account that is not signed in.
    ///
    /// Skipped when the store has no identity provider.
    pub(crate) fn check_current_account(&self, account: Option<&AccountId>) -> Result<()> {
        let (Some(account), Some(identity)) = (account, self.identity.as_ref()) else {
            return Ok(());
        };
        let current = identity.current_account_id();
        if current.as_ref() != Some(account) {
            return Err(ValidationError::AccountNotCurrent {
                account_id: account.to_string(),
                current: current.map(|c| c.to_string()),
            }
            .into());
        }
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        for table in self.arena.tables() {
            if !table.is_destroyed() {
                table.sync()?;
            }
        }
        Ok(())
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl Sweep for StoreInner {
    fn sweep_expired(&self) -> Result<usize> {
        self.ensure_open()?;
        let now = self.now();
        let mut removed = 0;
        for table in self.arena.tables() {
            match table.sweep_expired(now) {
                Ok(n) => removed += n,
                // Torn down between listing and sweeping.
                Err(Error::Schema(SchemaError::NamespaceNotReady { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        if removed > 0 {
            info!(target: "doccache::store", removed, "Swept expired documents");
        }
        Ok(removed)
    }
}

fn row_key(key: &DocumentKey) -> RowKey {
    RowKey::new(key.partition.clone(), key.document_id.clone())
}

fn tombstone(record: &DocumentRecord, now: Timestamp) -> DocumentRecord {
    DocumentRecord {
        document: record.document.without_body(),
        pending_operation: PendingOperation::Delete,
        sync_in_flight: false,
        last_modified: now,
        ..record.clone()
    }
}

/// The "user" partition needs an account; the "readonly" partition rejects one.
fn validate_scope(partition: &PartitionName, account_id: Option<&AccountId>) -> Result<()> {
    match (partition.as_str(), account_id) {
        (PartitionName::USER, None) => Err(ValidationError::InvalidAccountId {
            account_id: String::new(),
            reason: "the user partition requires an account",
        }
        .into()),
        (PartitionName::READONLY, Some(_)) => Err(ValidationError::InvalidPartition {
            partition: partition.to_string(),
            reason: "the readonly partition is not account-scoped",
        }
        .into()),
        _ => Ok(()),
    }
}
