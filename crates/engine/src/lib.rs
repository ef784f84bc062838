//! Document store engine for doccache
//!
//! This crate orchestrates the lower layers:
//! - DocumentStore: open/close, document operations, sync boundary
//! - Account namespace lifecycle: create, delete, account switches
//! - Configuration (`doccache.toml`) and the store builder
//! - Background TTL sweep
//!
//! The engine is the only component that knows about:
//! - Routing keys to namespaces
//! - The identity provider and the clock
//! - Pending-operation state transitions

#![warn(missing_docs)]
#![warn(clippy::all)]

mod arena;
pub mod builder;
pub mod config;
pub mod lifecycle;
pub mod store;
pub mod sweeper;

pub use builder::StoreBuilder;
pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use store::{
    ConfirmOutcome, DeleteOutcome, DocumentStore, PendingRecord, StoreStats, UpsertOutcome,
};
pub use sweeper::{Sweep, TtlSweeper};
