//! Integration tests for durability and recovery.
//!
//! These tests exercise the store across a full lifecycle
//! (open → write → drop → reopen): replay, torn logs, leftover
//! provisioning directories and layout migration.

#[path = "../common/mod.rs"]
mod common;

mod reopen;
