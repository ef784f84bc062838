//! doccache - offline-first partitioned document cache
//!
//! doccache keeps JSON documents on the device, grouped into partitions and
//! isolated per signed-in account, with a device-side time-to-live and a
//! pending-operation marker per document for a sync client to drain.
//!
//! # Quick Start
//!
//! ```ignore
//! use doccache::{DocumentKey, DocumentStore, DocumentWrapper, PendingOperation, WriteOptions};
//! use std::time::Duration;
//!
//! let store = DocumentStore::open("/data/cache")?;
//!
//! let key = DocumentKey::parse("user", Some("alice"), "doc1")?;
//! let doc = DocumentWrapper::from_json(r#"{"title":"Quarterly"}"#)?;
//! store.upsert(&key, doc, Some(PendingOperation::Create), Some(WriteOptions::with_ttl(Duration::from_secs(3600))))?;
//!
//! for pending in store.pending_operations(None, None)? {
//!     // push to the remote store, then:
//!     store.confirm_synced(&pending.record.key(), pending.record.pending_operation)?;
//! }
//! ```
//!
//! # Architecture
//!
//! - `doccache-core`: keys, records, errors, clock and identity
//! - `doccache-storage`: log format, per-namespace tables, layout and migration
//! - `doccache-engine`: the [`DocumentStore`] and account namespace lifecycle
//!
//! Storage internals are not re-exported; use the member crates directly
//! for tooling that needs them.

pub use doccache_core::*;
pub use doccache_engine::*;
pub use doccache_storage::{DurabilityMode, CURRENT_LAYOUT_VERSION, LEGACY_LAYOUT_VERSION};
