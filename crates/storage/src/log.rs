//! Append-only document log
//!
//! Every mutation of a namespace's table is appended here before it becomes
//! visible in memory. Replaying the log from the start rebuilds the table.
//!
//! # Atomicity
//!
//! A frame is either fully appended or not at all: a failed write is rolled
//! back by truncating to the previous length, and a crash mid-write leaves a
//! torn frame that replay discards. Compaction writes a complete new file and
//! renames it over the old one.

use crate::durability::DurabilityMode;
use crate::format::{
    decode_frames, decode_header, encode_frame, encode_header, LOG_FORMAT_V1, LOG_FORMAT_V2,
    LOG_HEADER_SIZE,
};
use doccache_core::{DocumentId, DocumentRecord, PartitionName};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Insert or fully replace a record
    Put(DocumentRecord),
    /// Physically remove a row
    Remove {
        /// Partition of the removed row
        partition: PartitionName,
        /// Id of the removed row
        document_id: DocumentId,
    },
}

impl LogEntry {
    /// MessagePack encoding with named fields
    pub fn encode(&self) -> Result<Vec<u8>, LogError> {
        rmp_serde::to_vec_named(self).map_err(|e| LogError::Encode(e.to_string()))
    }

    /// Decode a frame payload
    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Errors from reading or writing a document log
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File does not start with a valid header
    #[error("invalid log header in {0}")]
    InvalidHeader(PathBuf),

    /// File uses the pre-migration format
    #[error("log {path} uses legacy format v{version}")]
    LegacyFormat {
        /// Offending file
        path: PathBuf,
        /// Format found in the header
        version: u32,
    },

    /// File uses a format newer than this build
    #[error("log {path} uses unsupported format v{version}")]
    UnsupportedFormat {
        /// Offending file
        path: PathBuf,
        /// Format found in the header
        version: u32,
    },

    /// An intact frame did not decode
    #[error("frame {index} in {path} failed to decode: {reason}")]
    Decode {
        /// Offending file
        path: PathBuf,
        /// Zero-based frame index
        index: usize,
        /// Decoder message
        reason: String,
    },

    /// A record could not be encoded
    #[error("failed to encode log entry: {0}")]
    Encode(String),

    /// An earlier append failed and could not be rolled back
    #[error("log {0} is unusable after a failed append; reopen the store")]
    Poisoned(PathBuf),
}

impl From<LogError> for doccache_core::Error {
    fn from(e: LogError) -> Self {
        use doccache_core::Error;
        match e {
            LogError::Io(io) => Error::io("accessing document log", io),
            LogError::Poisoned(path) => Error::io(
                "appending to document log",
                io::Error::new(io::ErrorKind::Other, format!("{} is poisoned", path.display())),
            ),
            LogError::Encode(msg) => Error::Serialization(msg),
            other => Error::Corruption(other.to_string()),
        }
    }
}

/// A log opened for appending, plus what replay found in it.
#[derive(Debug)]
pub struct ReplayedLog {
    /// Handle positioned at the end of the valid data
    pub log: RecordLog,
    /// Entries in append order
    pub entries: Vec<LogEntry>,
    /// Bytes discarded from a torn tail
    pub torn_bytes: usize,
}

/// Handle on one namespace's `documents.log`.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    file: File,
    durability: DurabilityMode,
    write_position: u64,
    frames: u64,
    poisoned: bool,
}

impl RecordLog {
    /// Create an empty log (header only). Fails if the file exists.
    pub fn create(path: &Path, durability: DurabilityMode) -> Result<Self, LogError> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.write_all(&encode_header(LOG_FORMAT_V2))?;
        file.sync_all()?;
        Ok(RecordLog {
            path: path.to_path_buf(),
            file,
            durability,
            write_position: LOG_HEADER_SIZE as u64,
            frames: 0,
            poisoned: false,
        })
    }

    /// Open an existing log and replay it.
    ///
    /// A torn tail is truncated so later appends follow the last intact frame.
    pub fn open(path: &Path, durability: DurabilityMode) -> Result<ReplayedLog, LogError> {
        let bytes = fs::read(path)?;
        let version =
            decode_header(&bytes).ok_or_else(|| LogError::InvalidHeader(path.to_path_buf()))?;
        match version {
            LOG_FORMAT_V2 => {}
            LOG_FORMAT_V1 => {
                return Err(LogError::LegacyFormat {
                    path: path.to_path_buf(),
                    version,
                })
            }
            _ => {
                return Err(LogError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    version,
                })
            }
        }

        let decoded = decode_frames(&bytes[LOG_HEADER_SIZE..]);
        let mut entries = Vec::with_capacity(decoded.payloads.len());
        for (index, payload) in decoded.payloads.iter().enumerate() {
            let entry = LogEntry::decode(payload).map_err(|e| LogError::Decode {
                path: path.to_path_buf(),
                index,
                reason: e.to_string(),
            })?;
            entries.push(entry);
        }

        let valid_end = (LOG_HEADER_SIZE + decoded.valid_len) as u64;
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        if decoded.torn_bytes > 0 {
            warn!(
                target: "doccache::log",
                path = ?path,
                torn_bytes = decoded.torn_bytes,
                "Truncating torn tail of document log"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_end))?;

        debug!(target: "doccache::log", path = ?path, frames = entries.len(), "Replayed document log");
        Ok(ReplayedLog {
            log: RecordLog {
                path: path.to_path_buf(),
                file,
                durability,
                write_position: valid_end,
                frames: entries.len() as u64,
                poisoned: false,
            },
            entries,
            torn_bytes: decoded.torn_bytes,
        })
    }

    /// Append one entry; on failure the file is rolled back to its previous length.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        if self.poisoned {
            return Err(LogError::Poisoned(self.path.clone()));
        }
        let frame = encode_frame(LOG_FORMAT_V2 as u8, &entry.encode()?);

        let result = self.file.write_all(&frame).and_then(|_| {
            if self.durability.requires_immediate_fsync() {
                self.file.sync_data()
            } else {
                self.file.flush()
            }
        });

        match result {
            Ok(()) => {
                self.write_position += frame.len() as u64;
                self.frames += 1;
                Ok(())
            }
            Err(e) => {
                self.roll_back();
                Err(LogError::Io(e))
            }
        }
    }

    fn roll_back(&mut self) {
        let restored = self
            .file
            .set_len(self.write_position)
            .and_then(|_| self.file.seek(SeekFrom::Start(self.write_position)).map(|_| ()));
        if let Err(e) = restored {
            warn!(target: "doccache::log", path = ?self.path, error = %e, "Failed to roll back append; log poisoned");
            self.poisoned = true;
        }
    }

    /// Replace the log with one `Put` per record (compaction).
    ///
    /// The new file is complete and fsynced before it is renamed into place.
    pub fn rewrite<'a, I>(&mut self, records: I) -> Result<(), LogError>
    where
        I: IntoIterator<Item = &'a DocumentRecord>,
    {
        let mut payloads = Vec::new();
        for record in records {
            payloads.push(LogEntry::Put(record.clone()).encode()?);
        }
        let frames = payloads.len() as u64;
        write_log_file(&self.path, LOG_FORMAT_V2, payloads)?;

        // The old handle now points at the unlinked file.
        match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(mut file) => {
                let end = file.seek(SeekFrom::End(0))?;
                self.file = file;
                self.write_position = end;
                self.frames = frames;
                self.poisoned = false;
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(LogError::Io(e))
            }
        }
    }

    /// Force buffered frames to disk.
    pub fn sync(&mut self) -> Result<(), LogError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Frames currently in the file
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Size of the valid log in bytes
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write a complete log file (header + frames) atomically via temp + rename.
pub fn write_log_file<I>(path: &Path, format_version: u32, payloads: I) -> io::Result<()>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let temp_path = path.with_extension("log.tmp");
    let result = (|| {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut buffer = encode_header(format_version).to_vec();
        for payload in payloads {
            buffer.extend(encode_frame(format_version as u8, &payload));
        }
        file.write_all(&buffer)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        sync_parent(path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// fsync the directory containing `path` so a rename is durable.
pub fn sync_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        // Directories cannot be opened for sync on every platform.
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
