//! Core types for doccache
//!
//! This crate defines the foundational types shared by the storage and
//! engine layers:
//! - Timestamp / Clock: time source for expiration and `last_modified`
//! - PartitionName, AccountId, DocumentId, DocumentKey, NamespaceId: validated keys
//! - DocumentRecord, DocumentWrapper, PendingOperation: the stored unit
//! - DeviceTimeToLive, WriteOptions: write-time options
//! - Error, ValidationError, SchemaError: error taxonomy
//! - IdentityProvider, AccountIdContext: who is signed in, and when

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod identity;
pub mod timestamp;
pub mod types;

pub use error::{Error, Result, SchemaError, ValidationError};
pub use identity::{
    is_valid_for_app_center, is_valid_for_one_collector, prefixed_one_collector_id,
    AccountIdContext, AccountIdHistoryEntry, Anonymous, IdentityProvider, MAX_ACCOUNT_HISTORY,
};
pub use timestamp::{Clock, ManualClock, SystemClock, Timestamp};
pub use types::{
    AccountId, DeviceTimeToLive, DocumentId, DocumentKey, DocumentRecord, DocumentWrapper,
    Expiration, NamespaceId, PartitionName, PendingOperation, WriteOptions, DEFAULT_DEVICE_TTL,
    MAX_ACCOUNT_ID_LENGTH, MAX_DOCUMENT_ID_LENGTH, MAX_PARTITION_LENGTH,
};
