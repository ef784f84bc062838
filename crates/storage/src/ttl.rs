//! TTL (Time-To-Live) index for eager expiration sweeps
//!
//! Maps expiry timestamp → set of rows so a sweep only visits rows that
//! have actually expired:
//! - BTreeMap keeps expiry instants sorted
//! - find_expired() is O(expired count), not O(rows)

use crate::table::RowKey;
use doccache_core::Timestamp;
use std::collections::{BTreeMap, HashSet};

/// TTL index: expiry_timestamp → rows
#[derive(Debug, Default)]
pub struct TTLIndex {
    index: BTreeMap<Timestamp, HashSet<RowKey>>,
}

impl TTLIndex {
    /// Create a new empty TTLIndex
    pub fn new() -> Self {
        Self {
            index: BTreeMap::new(),
        }
    }

    /// Track a row expiring at `expiry_timestamp`.
    pub fn insert(&mut self, expiry_timestamp: Timestamp, key: RowKey) {
        self.index.entry(expiry_timestamp).or_default().insert(key);
    }

    /// Stop tracking a row (overwritten or removed).
    ///
    /// Drops the timestamp bucket once it is empty.
    pub fn remove(&mut self, expiry_timestamp: Timestamp, key: &RowKey) {
        if let Some(keys) = self.index.get_mut(&expiry_timestamp) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&expiry_timestamp);
            }
        }
    }

    /// Rows whose expiry is at or before `now`.
    pub fn find_expired(&self, now: Timestamp) -> Vec<RowKey> {
        self.index
            .range(..=now)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total number of tracked rows
    pub fn len(&self) -> usize {
        self.index.values().map(|keys| keys.len()).sum()
    }

    /// Number of distinct expiry instants
    pub fn timestamp_count(&self) -> usize {
        self.index.len()
    }
}
