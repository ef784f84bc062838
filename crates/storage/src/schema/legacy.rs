//! Layout v1 record format
//!
//! Version 1 stores kept the pending operation as a free-form string marker
//! and had no `last_modified` or `sync_in_flight` columns. Expiration was a
//! raw microsecond count, absent for rows that never expire.
//!
//! The writer half exists so stores in the old layout can be produced for
//! migration tests.

use crate::format::{decode_frames, decode_header, LOG_FORMAT_V1, LOG_HEADER_SIZE};
use crate::format::{Manifest, ManifestManager};
use crate::log::{write_log_file, LogEntry};
use crate::schema::paths::{StorePaths, LOG_FILE};
use doccache_core::{
    AccountId, DocumentId, DocumentRecord, DocumentWrapper, Expiration, PartitionName,
    PendingOperation, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Layout version of pre-namespace stores
pub const LEGACY_LAYOUT_VERSION: u32 = 1;

/// v1 row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    /// Partition name
    pub partition: String,
    /// Owning account
    pub account_id: Option<String>,
    /// Document id
    pub document_id: String,
    /// Serialized document body
    pub json: Option<String>,
    /// Entity tag
    pub etag: Option<String>,
    /// Expiry in microseconds since the epoch
    pub expiration_micros: Option<u64>,
    /// Pending operation marker ("CREATE", "REPLACE", "DELETE" or empty)
    pub operation: Option<String>,
}

/// v1 log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyEntry {
    /// Row written
    Put(LegacyRecord),
    /// Row removed
    Remove {
        /// Partition name
        partition: String,
        /// Document id
        document_id: String,
    },
}

impl LegacyEntry {
    /// Convert to the current entry type.
    pub fn upgrade(self) -> Result<LogEntry, String> {
        match self {
            LegacyEntry::Put(record) => upgrade_record(record).map(LogEntry::Put),
            LegacyEntry::Remove {
                partition,
                document_id,
            } => Ok(LogEntry::Remove {
                partition: PartitionName::new(partition).map_err(|e| e.to_string())?,
                document_id: DocumentId::new(document_id).map_err(|e| e.to_string())?,
            }),
        }
    }
}

fn upgrade_record(record: LegacyRecord) -> Result<DocumentRecord, String> {
    let pending_operation = PendingOperation::from_marker(record.operation.as_deref().unwrap_or(""))
        .map_err(|marker| format!("unknown operation marker {:?}", marker))?;
    let expiration = match record.expiration_micros {
        Some(micros) => Expiration::At(Timestamp::from_micros(micros)),
        None => Expiration::Never,
    };
    Ok(DocumentRecord {
        partition: PartitionName::new(record.partition).map_err(|e| e.to_string())?,
        account_id: record
            .account_id
            .map(AccountId::new)
            .transpose()
            .map_err(|e| e.to_string())?,
        document_id: DocumentId::new(record.document_id).map_err(|e| e.to_string())?,
        document: DocumentWrapper {
            json: record.json,
            etag: record.etag,
            last_updated: None,
        },
        expiration,
        pending_operation,
        sync_in_flight: false,
        // v1 never recorded local write times.
        last_modified: Timestamp::EPOCH,
    })
}

/// Read a v1 log and upgrade every entry.
///
/// A torn tail is dropped, as replay of a current log would.
pub fn read_legacy_log(path: &Path) -> Result<Vec<LogEntry>, String> {
    let bytes = fs::read(path).map_err(|e| format!("reading {}: {}", path.display(), e))?;
    match decode_header(&bytes) {
        Some(LEGACY_LAYOUT_VERSION) => {}
        Some(other) => {
            return Err(format!(
                "{} has format v{}, expected v{}",
                path.display(),
                other,
                LOG_FORMAT_V1
            ))
        }
        None => return Err(format!("{} has no valid log header", path.display())),
    }
    decode_frames(&bytes[LOG_HEADER_SIZE..])
        .payloads
        .into_iter()
        .enumerate()
        .map(|(index, payload)| {
            let legacy: LegacyEntry = rmp_serde::from_slice(payload)
                .map_err(|e| format!("{} frame {}: {}", path.display(), index, e))?;
            legacy.upgrade()
        })
        .collect()
}

/// Log format version found in a file header, if any.
pub fn log_format_of(path: &Path) -> io::Result<Option<u32>> {
    let bytes = fs::read(path)?;
    Ok(decode_header(&bytes))
}

/// Write a complete v1 store: MANIFEST plus one log per namespace.
///
/// `None` keys the account-agnostic log.
pub fn write_legacy_store(
    root: &Path,
    namespaces: &[(Option<&str>, Vec<LegacyEntry>)],
) -> io::Result<()> {
    let paths = StorePaths::new(root);
    fs::create_dir_all(root)?;
    for (account, entries) in namespaces {
        let log_path = match account {
            None => paths.legacy_default_log(),
            Some(id) => {
                let account = AccountId::new(*id)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
                let dir = paths.legacy_account_dir(&account);
                fs::create_dir_all(&dir)?;
                dir.join(LOG_FILE)
            }
        };
        let mut payloads = Vec::with_capacity(entries.len());
        for entry in entries {
            payloads.push(
                rmp_serde::to_vec_named(entry)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?,
            );
        }
        write_log_file(&log_path, LOG_FORMAT_V1, payloads)?;
    }
    let store_uuid = *uuid::Uuid::new_v4().as_bytes();
    ManifestManager::create(paths.manifest(), Manifest::new(LEGACY_LAYOUT_VERSION, store_uuid))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(())
}
