//! Per-namespace document table
//!
//! One logical table per namespace, keyed by (partition, document id).
//!
//! # Design
//!
//! - `log: Mutex<RecordLog>`: the write critical section; at most one writer
//!   per table, and every mutation is durable before it is visible
//! - `index: RwLock<TableIndex>`: rows + TTL index; readers clone a record
//!   under the read lock, so they see it before or after a write, never torn
//! - Tables of different namespaces share nothing
//!
//! # Read-modify-write
//!
//! [`DocumentTable::update`] runs a decision closure against the current row
//! while holding the write critical section, so decisions such as
//! "remove outright or leave a tombstone" cannot race another writer.

use crate::durability::DurabilityMode;
use crate::log::{LogEntry, RecordLog};
use crate::ttl::TTLIndex;
use doccache_core::{
    DocumentId, DocumentRecord, Error, NamespaceId, PartitionName, Result, SchemaError,
    Timestamp, ValidationError,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Do not bother compacting logs shorter than this many frames
const MIN_COMPACTION_FRAMES: u64 = 64;

/// Row key inside a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Partition of the row
    pub partition: PartitionName,
    /// Document id of the row
    pub document_id: DocumentId,
}

impl RowKey {
    /// Assemble a row key
    pub fn new(partition: PartitionName, document_id: DocumentId) -> Self {
        Self {
            partition,
            document_id,
        }
    }

    /// Row key of an existing record
    pub fn of(record: &DocumentRecord) -> Self {
        Self::new(record.partition.clone(), record.document_id.clone())
    }
}

/// What an [`DocumentTable::update`] closure decided to do with the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Leave the row as it is
    Keep,
    /// Insert or fully replace the row
    Put(DocumentRecord),
    /// Physically remove the row
    Remove,
}

/// Counters for one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    /// Physical rows, tombstones and expired rows included
    pub rows: usize,
    /// Rows with a pending operation
    pub pending: usize,
    /// Frames in the log
    pub log_frames: u64,
    /// Log size in bytes
    pub log_bytes: u64,
}

#[derive(Debug, Default)]
struct TableIndex {
    rows: FxHashMap<RowKey, DocumentRecord>,
    ttl: TTLIndex,
}

impl TableIndex {
    fn put(&mut self, record: DocumentRecord) -> Option<DocumentRecord> {
        let key = RowKey::of(&record);
        if let Some(at) = record.expiration.timestamp() {
            self.ttl.insert(at, key.clone());
        }
        let previous = self.rows.insert(key.clone(), record);
        if let Some(old_at) = previous.as_ref().and_then(|p| p.expiration.timestamp()) {
            let still_tracked = self
                .rows
                .get(&key)
                .and_then(|r| r.expiration.timestamp())
                == Some(old_at);
            if !still_tracked {
                self.ttl.remove(old_at, &key);
            }
        }
        previous
    }

    fn remove(&mut self, key: &RowKey) -> Option<DocumentRecord> {
        let previous = self.rows.remove(key);
        if let Some(at) = previous.as_ref().and_then(|p| p.expiration.timestamp()) {
            self.ttl.remove(at, key);
        }
        previous
    }

    fn apply(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Put(record) => {
                self.put(record);
            }
            LogEntry::Remove {
                partition,
                document_id,
            } => {
                self.remove(&RowKey::new(partition, document_id));
            }
        }
    }
}

/// Durable table of documents for one namespace.
#[derive(Debug)]
pub struct DocumentTable {
    namespace: NamespaceId,
    log: Mutex<RecordLog>,
    index: RwLock<TableIndex>,
    destroyed: AtomicBool,
    compaction_ratio: f64,
}

impl DocumentTable {
    /// Open a table by replaying its log.
    pub fn open(
        namespace: NamespaceId,
        log_path: &Path,
        durability: DurabilityMode,
        compaction_ratio: f64,
    ) -> Result<Self> {
        let replayed = RecordLog::open(log_path, durability)?;
        let mut index = TableIndex::default();
        for entry in replayed.entries {
            index.apply(entry);
        }
        debug!(
            target: "doccache::table",
            namespace = %namespace,
            rows = index.rows.len(),
            torn_bytes = replayed.torn_bytes,
            "Opened document table"
        );
        Ok(Self {
            namespace,
            log: Mutex::new(replayed.log),
            index: RwLock::new(index),
            destroyed: AtomicBool::new(false),
            compaction_ratio,
        })
    }

    /// Namespace this table serves
    pub fn namespace(&self) -> &NamespaceId {
        &self.namespace
    }

    /// Snapshot of one physical row, ignoring expiration.
    pub fn get(&self, key: &RowKey) -> Option<DocumentRecord> {
        self.index.read().rows.get(key).cloned()
    }

    /// Insert or fully replace a record; returns the previous row.
    pub fn put(&self, record: DocumentRecord) -> Result<Option<DocumentRecord>> {
        let key = RowKey::of(&record);
        self.update(&key, move |current| (Mutation::Put(record), current.cloned()))
    }

    /// Physically remove a row; returns it if it existed.
    pub fn remove(&self, key: &RowKey) -> Result<Option<DocumentRecord>> {
        self.update(key, |current| match current {
            Some(row) => (Mutation::Remove, Some(row.clone())),
            None => (Mutation::Keep, None),
        })
    }

    /// Read-modify-write one row inside the table's write critical section.
    ///
    /// The closure sees the current physical row and returns the mutation to
    /// apply plus a value handed back to the caller. The mutation is logged
    /// before it is applied; if logging fails nothing changes.
    pub fn update<F, T>(&self, key: &RowKey, decide: F) -> Result<T>
    where
        F: FnOnce(Option<&DocumentRecord>) -> (Mutation, T),
    {
        let mut log = self.log.lock();
        self.ensure_live()?;

        let (mutation, output) = {
            let index = self.index.read();
            decide(index.rows.get(key))
        };

        let entry = match mutation {
            Mutation::Keep => return Ok(output),
            Mutation::Put(record) => {
                self.check_owner(&record)?;
                if RowKey::of(&record) != *key {
                    return Err(Error::Validation(ValidationError::InvalidDocument(
                        "record key does not match the updated row".to_string(),
                    )));
                }
                LogEntry::Put(record)
            }
            Mutation::Remove => LogEntry::Remove {
                partition: key.partition.clone(),
                document_id: key.document_id.clone(),
            },
        };

        log.append(&entry)?;
        self.index.write().apply(entry);
        self.maybe_compact(&mut log);
        Ok(output)
    }

    /// Rows matching `filter`, expired rows and tombstones included.
    pub fn scan<F>(&self, filter: F) -> Vec<DocumentRecord>
    where
        F: Fn(&DocumentRecord) -> bool,
    {
        self.index
            .read()
            .rows
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect()
    }

    /// Rows with a pending operation.
    pub fn pending(&self) -> Vec<DocumentRecord> {
        self.scan(|r| r.pending_operation.is_pending())
    }

    /// Rows whose expiry is at or before `now`, per the TTL index.
    pub fn expired_candidates(&self, now: Timestamp) -> Vec<RowKey> {
        self.index.read().ttl.find_expired(now)
    }

    /// Remove expired rows that have no pending operation.
    ///
    /// Pending rows (tombstones included) stay regardless of expiration.
    pub fn sweep_expired(&self, now: Timestamp) -> Result<usize> {
        let mut removed = 0;
        for key in self.expired_candidates(now) {
            let evicted = self.update(&key, |current| match current {
                Some(row) if row.is_expired_at(now) && !row.pending_operation.is_pending() => {
                    (Mutation::Remove, true)
                }
                _ => (Mutation::Keep, false),
            })?;
            if evicted {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(target: "doccache::table", namespace = %self.namespace, removed, "Swept expired rows");
        }
        Ok(removed)
    }

    /// Rewrite the log with only the live rows.
    pub fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        self.ensure_live()?;
        self.compact_locked(&mut log)
    }

    fn compact_locked(&self, log: &mut RecordLog) -> Result<()> {
        let index = self.index.read();
        let before = log.frame_count();
        log.rewrite(index.rows.values())?;
        info!(
            target: "doccache::table",
            namespace = %self.namespace,
            frames_before = before,
            frames_after = log.frame_count(),
            "Compacted document log"
        );
        Ok(())
    }

    fn maybe_compact(&self, log: &mut RecordLog) {
        let frames = log.frame_count();
        if frames < MIN_COMPACTION_FRAMES {
            return;
        }
        let live = self.index.read().rows.len() as u64;
        let dead_ratio = frames.saturating_sub(live) as f64 / frames as f64;
        if dead_ratio > self.compaction_ratio {
            if let Err(e) = self.compact_locked(log) {
                warn!(target: "doccache::table", namespace = %self.namespace, error = %e, "Automatic compaction failed");
            }
        }
    }

    /// Force buffered log frames to disk
    pub fn sync(&self) -> Result<()> {
        self.log.lock().sync()?;
        Ok(())
    }

    /// Physical row count
    pub fn len(&self) -> usize {
        self.index.read().rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row and log counters
    pub fn stats(&self) -> TableStats {
        let log = self.log.lock();
        let index = self.index.read();
        TableStats {
            rows: index.rows.len(),
            pending: index
                .rows
                .values()
                .filter(|r| r.pending_operation.is_pending())
                .count(),
            log_frames: log.frame_count(),
            log_bytes: log.size(),
        }
    }

    /// Invalidate the table once its namespace has been torn down.
    ///
    /// Waits for an in-flight write to finish, then rejects all later writes
    /// and drops the in-memory rows.
    pub fn mark_destroyed(&self) {
        let _log = self.log.lock();
        self.destroyed.store(true, Ordering::Release);
        let mut index = self.index.write();
        index.rows.clear();
        index.ttl.clear();
    }

    /// Whether the namespace behind this table was torn down
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(SchemaError::NamespaceNotReady {
                namespace: self.namespace.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_owner(&self, record: &DocumentRecord) -> Result<()> {
        if record.account_id.as_ref() != self.namespace.account_id() {
            return Err(ValidationError::InvalidAccountId {
                account_id: record
                    .account_id
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                reason: "does not match the target namespace",
            }
            .into());
        }
        Ok(())
    }
}
