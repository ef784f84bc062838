//! Keys, records and write options
//!
//! Names are validated once at construction so the storage layer can assume
//! well-formed keys:
//! - [`PartitionName`]: logical collection ("readonly", "user", ...)
//! - [`AccountId`]: signed-in identity owning an account namespace
//! - [`DocumentId`]: unique within (partition, account)
//! - [`DocumentKey`]: the full unique key of a [`DocumentRecord`]

use crate::error::ValidationError;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum partition name length in bytes
pub const MAX_PARTITION_LENGTH: usize = 256;

/// Maximum account identifier length in characters
pub const MAX_ACCOUNT_ID_LENGTH: usize = 256;

/// Maximum document identifier length in bytes
pub const MAX_DOCUMENT_ID_LENGTH: usize = 255;

/// Default device time-to-live: one day
pub const DEFAULT_DEVICE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Characters the remote store refuses in document ids
const FORBIDDEN_DOCUMENT_ID_CHARS: [char; 4] = ['/', '\\', '?', '#'];

// ============================================================================
// Names
// ============================================================================

/// Logical named collection, independent of account scoping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionName(String);

impl PartitionName {
    /// Name of the shared, account-agnostic partition
    pub const READONLY: &'static str = "readonly";

    /// Name of the per-account partition
    pub const USER: &'static str = "user";

    /// Validate and wrap a partition name.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.len() > MAX_PARTITION_LENGTH {
            Some("longer than 256 bytes")
        } else if name.chars().any(char::is_control) {
            Some("contains control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ValidationError::InvalidPartition {
                partition: name,
                reason,
            }),
            None => Ok(PartitionName(name)),
        }
    }

    /// The shared "readonly" partition.
    pub fn readonly() -> Self {
        PartitionName(Self::READONLY.to_string())
    }

    /// The per-account "user" partition.
    pub fn user() -> Self {
        PartitionName(Self::USER.to_string())
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated identity that owns an account namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap an account id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.chars().count() > MAX_ACCOUNT_ID_LENGTH {
            Some("longer than 256 characters")
        } else if id.chars().any(char::is_control) {
            Some("contains control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ValidationError::InvalidAccountId { account_id: id, reason }),
            None => Ok(AccountId(id)),
        }
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document identifier, unique within (partition, account).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate and wrap a document id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.len() > MAX_DOCUMENT_ID_LENGTH {
            Some("longer than 255 bytes")
        } else if id.contains(FORBIDDEN_DOCUMENT_ID_CHARS) {
            Some("contains one of '/', '\\', '?', '#'")
        } else if id.chars().any(char::is_control) {
            Some("contains control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ValidationError::InvalidDocumentId {
                document_id: id,
                reason,
            }),
            None => Ok(DocumentId(id)),
        }
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical storage grouping.
///
/// Account-agnostic partitions live in the default namespace; every signed-in
/// account gets its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamespaceId {
    /// Namespace for documents without an account
    Default,
    /// Namespace owned by one account
    Account(AccountId),
}

impl NamespaceId {
    /// Namespace that holds documents for the given (optional) account.
    pub fn for_account(account_id: Option<&AccountId>) -> Self {
        match account_id {
            Some(id) => NamespaceId::Account(id.clone()),
            None => NamespaceId::Default,
        }
    }

    /// Owning account, if any
    pub fn account_id(&self) -> Option<&AccountId> {
        match self {
            NamespaceId::Default => None,
            NamespaceId::Account(id) => Some(id),
        }
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceId::Default => f.write_str("default"),
            NamespaceId::Account(id) => write!(f, "account:{}", id),
        }
    }
}

/// Unique key of a cached document: (partition, account, document id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    /// Logical collection
    pub partition: PartitionName,
    /// Owning account for account-scoped partitions
    pub account_id: Option<AccountId>,
    /// Document identifier
    pub document_id: DocumentId,
}

impl DocumentKey {
    /// Assemble a key from validated parts
    pub fn new(
        partition: PartitionName,
        account_id: Option<AccountId>,
        document_id: DocumentId,
    ) -> Self {
        Self {
            partition,
            account_id,
            document_id,
        }
    }

    /// Validate raw strings into a key.
    pub fn parse(
        partition: &str,
        account_id: Option<&str>,
        document_id: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            partition: PartitionName::new(partition)?,
            account_id: account_id.map(AccountId::new).transpose()?,
            document_id: DocumentId::new(document_id)?,
        })
    }

    /// Namespace the key routes to
    pub fn namespace(&self) -> NamespaceId {
        NamespaceId::for_account(self.account_id.as_ref())
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account_id {
            Some(account) => write!(f, "{}/{}/{}", self.partition, account, self.document_id),
            None => write!(f, "{}/{}", self.partition, self.document_id),
        }
    }
}

// ============================================================================
// Pending operations
// ============================================================================

/// Local change the remote store has not observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOperation {
    /// In sync with the remote store
    #[default]
    None,
    /// Created locally
    Create,
    /// Replaced locally
    Replace,
    /// Deleted locally (tombstone)
    Delete,
}

impl PendingOperation {
    /// Whether a sync client still has to push this record
    pub fn is_pending(&self) -> bool {
        !matches!(self, PendingOperation::None)
    }

    /// Lowercase marker name
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingOperation::None => "none",
            PendingOperation::Create => "create",
            PendingOperation::Replace => "replace",
            PendingOperation::Delete => "delete",
        }
    }

    /// Parse a legacy string marker ("CREATE", "replace", ...).
    ///
    /// Empty strings map to `None`; unknown markers return `Err` with the input.
    pub fn from_marker(marker: &str) -> Result<Self, String> {
        match marker.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(PendingOperation::None),
            "create" => Ok(PendingOperation::Create),
            "replace" => Ok(PendingOperation::Replace),
            "delete" => Ok(PendingOperation::Delete),
            _ => Err(marker.to_string()),
        }
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Expiration and options
// ============================================================================

/// Absolute expiration of a cached row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expiration {
    /// Never expires
    Never,
    /// Unreadable at and after this instant
    At(Timestamp),
}

impl Expiration {
    /// Whether the row is past its expiration at `now`
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        match self {
            Expiration::Never => false,
            Expiration::At(at) => now >= *at,
        }
    }

    /// Expiry instant, if any
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Expiration::Never => None,
            Expiration::At(at) => Some(*at),
        }
    }
}

/// Device-side time-to-live for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTimeToLive {
    /// Keep until explicitly removed
    NoExpiry,
    /// Expire this long after the write
    For(Duration),
    /// Do not keep a local copy at all
    NoCache,
}

impl DeviceTimeToLive {
    /// Absolute expiration for a write at `now`; `None` for [`DeviceTimeToLive::NoCache`].
    pub fn expiration_from(&self, now: Timestamp) -> Option<Expiration> {
        match self {
            DeviceTimeToLive::NoExpiry => Some(Expiration::Never),
            DeviceTimeToLive::For(ttl) => Some(Expiration::At(now.saturating_add(*ttl))),
            DeviceTimeToLive::NoCache => None,
        }
    }
}

impl Default for DeviceTimeToLive {
    fn default() -> Self {
        DeviceTimeToLive::For(DEFAULT_DEVICE_TTL)
    }
}

/// Options consumed by upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Device-side time-to-live
    pub device_time_to_live: DeviceTimeToLive,
}

impl WriteOptions {
    /// Options with an explicit time-to-live
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            device_time_to_live: DeviceTimeToLive::For(ttl),
        }
    }

    /// Options that keep the row until it is removed
    pub fn no_expiry() -> Self {
        Self {
            device_time_to_live: DeviceTimeToLive::NoExpiry,
        }
    }

    /// Options that skip the local copy
    pub fn no_cache() -> Self {
        Self {
            device_time_to_live: DeviceTimeToLive::NoCache,
        }
    }
}

// ============================================================================
// Documents
// ============================================================================

/// Serialized document plus the metadata the remote store attaches to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentWrapper {
    /// Serialized JSON body; `None` on tombstones
    pub json: Option<String>,
    /// Entity tag for optimistic concurrency
    pub etag: Option<String>,
    /// Server-side last update time
    pub last_updated: Option<Timestamp>,
}

impl DocumentWrapper {
    /// Wrap a JSON value.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            json: Some(value.to_string()),
            etag: None,
            last_updated: None,
        }
    }

    /// Wrap an already serialized JSON body, checking that it parses.
    pub fn from_json(json: impl Into<String>) -> Result<Self, ValidationError> {
        let json = json.into();
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| ValidationError::InvalidDocument(e.to_string()))?;
        Ok(Self {
            json: Some(json),
            etag: None,
            last_updated: None,
        })
    }

    /// Attach an entity tag
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Attach the server timestamp
    pub fn with_last_updated(mut self, at: Timestamp) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// Check that the wrapper carries a parseable body.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.json.as_deref() {
            None => Err(ValidationError::InvalidDocument(
                "document body is missing".to_string(),
            )),
            Some(json) => serde_json::from_str::<serde_json::Value>(json)
                .map(|_| ())
                .map_err(|e| ValidationError::InvalidDocument(e.to_string())),
        }
    }

    /// Parse the body back into a JSON value.
    pub fn to_value(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        self.json.as_deref().map(serde_json::from_str).transpose()
    }

    /// Same metadata with the body dropped (tombstone payload).
    pub fn without_body(&self) -> Self {
        Self {
            json: None,
            etag: self.etag.clone(),
            last_updated: self.last_updated,
        }
    }
}

/// The unit of storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Logical collection
    pub partition: PartitionName,
    /// Owning account, for account-scoped partitions
    pub account_id: Option<AccountId>,
    /// Identifier within (partition, account)
    pub document_id: DocumentId,
    /// Opaque document content
    pub document: DocumentWrapper,
    /// When the row stops being readable
    pub expiration: Expiration,
    /// Change the remote store has not seen yet
    pub pending_operation: PendingOperation,
    /// A sync client has started pushing the pending change
    #[serde(default)]
    pub sync_in_flight: bool,
    /// Time of the last local write
    pub last_modified: Timestamp,
}

impl DocumentRecord {
    /// Unique key of this record
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(
            self.partition.clone(),
            self.account_id.clone(),
            self.document_id.clone(),
        )
    }

    /// Past its expiration at `now`
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expiration.is_expired_at(now)
    }

    /// Delete-pending record kept until the remote confirms
    pub fn is_tombstone(&self) -> bool {
        self.pending_operation == PendingOperation::Delete
    }

    /// Whether reads at `now` should report this record
    pub fn is_visible_at(&self, now: Timestamp) -> bool {
        !self.is_tombstone() && !self.is_expired_at(now)
    }
}
