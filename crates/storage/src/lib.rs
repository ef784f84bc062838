//! Storage layer for doccache
//!
//! This crate implements the on-device persistence of the cache:
//! - MANIFEST and document log byte formats
//! - RecordLog: append-only, checksummed, replayable log per namespace
//! - DocumentTable: in-memory row index over a RecordLog
//! - TTL index for eager expiration sweeps
//! - SchemaManager: store layout, namespace provisioning, v1 → v2 migration
//!
//! # Durability
//!
//! A mutation reaches the log (fsynced under [`DurabilityMode::Always`])
//! before it is applied in memory; a failed append changes nothing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod durability;
pub mod format;
pub mod log;
pub mod schema;
pub mod table;
pub mod ttl;

pub use durability::DurabilityMode;
pub use log::{LogEntry, LogError, RecordLog};
pub use schema::{SchemaManager, CURRENT_LAYOUT_VERSION, LEGACY_LAYOUT_VERSION};
pub use table::{DocumentTable, Mutation, RowKey, TableStats};
pub use ttl::TTLIndex;
