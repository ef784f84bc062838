//! Concurrency tests for the document store.
//!
//! Multiple threads share one store through an `Arc`: same-key writers,
//! readers racing writers, independent namespaces and namespace
//! provisioning/teardown racing document operations.

#[path = "../common/mod.rs"]
mod common;

mod writers;
