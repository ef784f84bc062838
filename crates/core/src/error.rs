//! Error types for the document cache
//!
//! Failures fall into four families:
//!
//! - [`ValidationError`]: malformed input, rejected before any storage access
//! - [`Error::StorageIo`] / [`Error::Corruption`]: the persistence layer failed;
//!   the operation had no effect and may be retried
//! - [`SchemaError`]: layout migration or namespace provisioning failed
//! - [`Error::NotFound`]: only produced by strict read-by-key
//!
//! Every store operation returns [`Result`]; nothing here aborts the process.

use crate::types::{DocumentKey, PendingOperation};
use std::io;
use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for cache operations
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before touching storage
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Underlying persistence failure (disk, permissions)
    #[error("Storage I/O error while {context}: {source}")]
    StorageIo {
        /// What the store was doing
        context: String,
        /// The I/O error reported by the OS
        #[source]
        source: io::Error,
    },

    /// Persisted bytes failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Layout or namespace problem
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Strict read of a key that is absent, expired or deleted
    #[error("Document not found: {0}")]
    NotFound(DocumentKey),

    /// Encoding or decoding a record failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file or value rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The store has been closed
    #[error("Store is closed")]
    Closed,
}

impl Error {
    /// Wrap an I/O error with a short description of the failing step.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::StorageIo {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageIo { .. })
    }

    /// Whether the caller supplied bad input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Whether this is a layout/provisioning failure.
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::io("performing storage I/O", source)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Malformed keys, documents or options
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Partition name is empty, too long or contains forbidden characters
    #[error("invalid partition {partition:?}: {reason}")]
    InvalidPartition {
        /// Offending partition name
        partition: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Account identifier is empty, too long or contains forbidden characters
    #[error("invalid account id {account_id:?}: {reason}")]
    InvalidAccountId {
        /// Offending account id
        account_id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Document identifier is empty, too long or contains forbidden characters
    #[error("invalid document id {document_id:?}: {reason}")]
    InvalidDocumentId {
        /// Offending document id
        document_id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Document body is not acceptable
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The operation marker cannot be used with this call
    #[error("operation marker {0} is not valid for upsert; use delete")]
    UnsupportedMarker(PendingOperation),

    /// A local change for an account that is not signed in
    #[error("account {account_id:?} is not the current account (current: {current:?})")]
    AccountNotCurrent {
        /// Account named by the write
        account_id: String,
        /// Account reported by the identity provider
        current: Option<String>,
    },

    /// A pending change was written with the no-cache time-to-live
    #[error("pending {0} cannot be written with a no-cache time-to-live")]
    PendingWriteNotCached(PendingOperation),
}

/// Layout and namespace provisioning failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Target namespace does not exist (or was torn down)
    #[error("namespace {namespace} is not ready")]
    NamespaceNotReady {
        /// Namespace display name
        namespace: String,
    },

    /// On-disk layout is newer than this build understands
    #[error("unsupported layout version {found} (this build supports up to {supported})")]
    UnsupportedLayout {
        /// Layout version in the MANIFEST
        found: u32,
        /// Newest version this build can serve
        supported: u32,
    },

    /// Layout migration could not complete; the previous layout is intact
    #[error("migration from layout v{from} to v{to} failed: {reason}")]
    MigrationFailed {
        /// Layout version found on disk
        from: u32,
        /// Layout version being migrated to
        to: u32,
        /// Underlying failure
        reason: String,
    },

    /// Creating or tearing down a namespace failed
    #[error("provisioning namespace {namespace} failed: {reason}")]
    ProvisioningFailed {
        /// Namespace display name
        namespace: String,
        /// Underlying failure
        reason: String,
    },
}
