//! Layout migration v1 → v2
//!
//! Every step is atomic on its own and safe to repeat, so a migration that
//! stops halfway (crash, I/O error) simply runs again on the next open:
//!
//! 1. Rewrite the root `documents.log` into `default/documents.log`
//!    (temp + rename), then drop the v1 file
//! 2. For each `user-<hex>` directory: rewrite its log in place
//!    (temp + rename), write `NAMESPACE`, rename the directory under
//!    `accounts/`
//! 3. Bump the MANIFEST layout version
//!
//! Until step 3 lands the store is still v1 on disk and the remaining steps
//! are picked up where they stopped.

use super::legacy::{log_format_of, read_legacy_log, LEGACY_LAYOUT_VERSION};
use super::paths::{
    parse_account_dir_name, StorePaths, LEGACY_ACCOUNT_PREFIX, LOG_FILE, NAMESPACE_FILE,
};
use super::CURRENT_LAYOUT_VERSION;
use crate::format::{ManifestManager, LOG_FORMAT_V1, LOG_FORMAT_V2};
use crate::log::{sync_parent, write_log_file, LogEntry};
use doccache_core::{AccountId, Error, NamespaceId, Result, SchemaError};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Bring a v1 store up to the current layout.
pub(super) fn migrate_v1_to_v2(paths: &StorePaths, manifest: &mut ManifestManager) -> Result<()> {
    info!(
        target: "doccache::schema",
        root = ?paths.root(),
        from = LEGACY_LAYOUT_VERSION,
        to = CURRENT_LAYOUT_VERSION,
        "Migrating store layout"
    );

    run_steps(paths).map_err(failed)?;
    manifest
        .set_layout_version(CURRENT_LAYOUT_VERSION)
        .map_err(|e| failed(format!("updating MANIFEST: {}", e)))?;

    info!(target: "doccache::schema", root = ?paths.root(), "Layout migration complete");
    Ok(())
}

fn failed(reason: String) -> Error {
    SchemaError::MigrationFailed {
        from: LEGACY_LAYOUT_VERSION,
        to: CURRENT_LAYOUT_VERSION,
        reason,
    }
    .into()
}

fn run_steps(paths: &StorePaths) -> std::result::Result<(), String> {
    let default_dir = paths.namespace_dir(&NamespaceId::Default);
    fs::create_dir_all(&default_dir).map_err(|e| io_reason("creating default namespace", e))?;
    fs::create_dir_all(paths.accounts_dir()).map_err(|e| io_reason("creating accounts directory", e))?;

    let legacy_default = paths.legacy_default_log();
    if legacy_default.exists() {
        let entries = read_legacy_log(&legacy_default)?;
        check_owner(&entries, None)?;
        rewrite(&paths.log_file(&NamespaceId::Default), entries)?;
        fs::remove_file(&legacy_default).map_err(|e| io_reason("removing v1 default log", e))?;
        debug!(target: "doccache::schema", "Migrated default namespace");
    }

    let listing = fs::read_dir(paths.root()).map_err(|e| io_reason("listing store root", e))?;
    for dir_entry in listing {
        let dir_entry = dir_entry.map_err(|e| io_reason("listing store root", e))?;
        let name = dir_entry.file_name().to_string_lossy().into_owned();
        let Some(encoded) = name.strip_prefix(LEGACY_ACCOUNT_PREFIX) else {
            continue;
        };
        let account = parse_account_dir_name(encoded)
            .ok_or_else(|| format!("cannot decode v1 account directory {:?}", name))?;
        migrate_account(paths, &dir_entry.path(), &account)?;
    }
    Ok(())
}

fn migrate_account(
    paths: &StorePaths,
    legacy_dir: &Path,
    account: &AccountId,
) -> std::result::Result<(), String> {
    let target = paths.namespace_dir(&NamespaceId::Account(account.clone()));
    if target.exists() {
        return Err(format!(
            "account {} exists in both v1 and v2 layout",
            account
        ));
    }

    let log_path = legacy_dir.join(LOG_FILE);
    match log_format_of(&log_path).map_err(|e| io_reason("reading v1 account log", e))? {
        Some(LOG_FORMAT_V1) => {
            let entries = read_legacy_log(&log_path)?;
            check_owner(&entries, Some(account))?;
            rewrite(&log_path, entries)?;
        }
        // Rewritten by an earlier, interrupted run.
        Some(LOG_FORMAT_V2) => {}
        Some(other) => return Err(format!("{} has unknown format v{}", log_path.display(), other)),
        None => return Err(format!("{} has no valid log header", log_path.display())),
    }

    let marker = legacy_dir.join(NAMESPACE_FILE);
    fs::write(&marker, account.as_str()).map_err(|e| io_reason("writing NAMESPACE", e))?;
    fs::rename(legacy_dir, &target).map_err(|e| io_reason("moving account directory", e))?;
    sync_parent(&target).map_err(|e| io_reason("syncing accounts directory", e))?;

    debug!(target: "doccache::schema", account = %account, "Migrated account namespace");
    Ok(())
}

fn rewrite(path: &Path, entries: Vec<LogEntry>) -> std::result::Result<(), String> {
    let mut payloads = Vec::with_capacity(entries.len());
    for entry in &entries {
        payloads.push(entry.encode().map_err(|e| e.to_string())?);
    }
    write_log_file(path, LOG_FORMAT_V2, payloads)
        .map_err(|e| io_reason(&format!("rewriting {}", path.display()), e))
}

fn check_owner(entries: &[LogEntry], account: Option<&AccountId>) -> std::result::Result<(), String> {
    for entry in entries {
        if let LogEntry::Put(record) = entry {
            if record.account_id.as_ref() != account {
                return Err(format!(
                    "record {} is stored in the namespace of {:?}",
                    record.key(),
                    account.map(|a| a.as_str())
                ));
            }
        }
    }
    Ok(())
}

fn io_reason(step: &str, e: std::io::Error) -> String {
    format!("{}: {}", step, e)
}
