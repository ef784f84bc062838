//! Schema manager: store layout, namespaces and migration
//!
//! Owns the directory tree of a store:
//!
//! - creates a fresh store or validates an existing one
//! - migrates older layouts before anything is served
//! - provisions and tears down account namespaces
//! - opens a namespace's [`DocumentTable`]
//!
//! # Namespace atomicity
//!
//! A namespace is built in a `<hex>.creating` staging directory and renamed
//! into place; teardown renames it to `.deleting-<uuid>` before removing it.
//! From a caller's view (and after a crash) a namespace is therefore either
//! fully present or fully absent. Leftover staging and trash directories are
//! removed on the next open.
//!
//! Callers serialize create/destroy per namespace; different namespaces can
//! be provisioned concurrently.

pub mod legacy;
mod migrate;
pub mod paths;

use crate::durability::DurabilityMode;
use crate::format::{Manifest, ManifestManager};
use crate::log::{sync_parent, RecordLog};
use crate::table::DocumentTable;
use doccache_core::{AccountId, Error, NamespaceId, Result, SchemaError};
use paths::{parse_account_dir_name, StorePaths, CREATING_SUFFIX, DELETING_PREFIX, NAMESPACE_FILE};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

pub use legacy::LEGACY_LAYOUT_VERSION;

/// Layout version written by this build
pub const CURRENT_LAYOUT_VERSION: u32 = 2;

/// Directory-level owner of a store.
#[derive(Debug)]
pub struct SchemaManager {
    paths: StorePaths,
    durability: DurabilityMode,
    manifest: Manifest,
}

impl SchemaManager {
    /// Create or open the store at `root`, migrating it if needed.
    ///
    /// # Errors
    ///
    /// - `SchemaError::UnsupportedLayout` if the store was written by a newer build
    /// - `SchemaError::MigrationFailed` if an older layout could not be upgraded;
    ///   the files on disk are left in a state the next open can resume from
    pub fn open(root: &Path, durability: DurabilityMode) -> Result<Self> {
        let paths = StorePaths::new(root);
        fs::create_dir_all(root).map_err(|e| Error::io("creating store directory", e))?;

        let manifest_path = paths.manifest();
        let mut manager = if ManifestManager::exists(&manifest_path) {
            ManifestManager::load(manifest_path)?
        } else {
            Self::initialize(&paths)?
        };

        let found = manager.manifest().layout_version;
        if found > CURRENT_LAYOUT_VERSION {
            return Err(SchemaError::UnsupportedLayout {
                found,
                supported: CURRENT_LAYOUT_VERSION,
            }
            .into());
        }
        if found < CURRENT_LAYOUT_VERSION {
            migrate::migrate_v1_to_v2(&paths, &mut manager)?;
        }

        let schema = SchemaManager {
            paths,
            durability,
            manifest: *manager.manifest(),
        };
        schema.ensure_default_namespace()?;
        schema.remove_leftovers()?;

        info!(
            target: "doccache::schema",
            root = ?root,
            layout_version = schema.manifest.layout_version,
            durability = ?durability,
            "Opened store layout"
        );
        Ok(schema)
    }

    fn initialize(paths: &StorePaths) -> Result<ManifestManager> {
        fs::create_dir_all(paths.accounts_dir())
            .map_err(|e| Error::io("creating accounts directory", e))?;
        let store_uuid = *uuid::Uuid::new_v4().as_bytes();
        let manager = ManifestManager::create(
            paths.manifest(),
            Manifest::new(CURRENT_LAYOUT_VERSION, store_uuid),
        )?;
        info!(target: "doccache::schema", root = ?paths.root(), "Initialized new store");
        Ok(manager)
    }

    fn ensure_default_namespace(&self) -> Result<()> {
        let dir = self.paths.namespace_dir(&NamespaceId::Default);
        fs::create_dir_all(&dir).map_err(|e| Error::io("creating default namespace", e))?;
        fs::create_dir_all(self.paths.accounts_dir())
            .map_err(|e| Error::io("creating accounts directory", e))?;
        let log = self.paths.log_file(&NamespaceId::Default);
        if !log.exists() {
            RecordLog::create(&log, self.durability)?;
        }
        Ok(())
    }

    fn remove_leftovers(&self) -> Result<()> {
        let listing = fs::read_dir(self.paths.accounts_dir())
            .map_err(|e| Error::io("listing account namespaces", e))?;
        for entry in listing {
            let entry = entry.map_err(|e| Error::io("listing account namespaces", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(CREATING_SUFFIX) || name.starts_with(DELETING_PREFIX) {
                warn!(target: "doccache::schema", directory = %name, "Removing interrupted namespace operation");
                fs::remove_dir_all(entry.path())
                    .map_err(|e| Error::io("removing leftover namespace directory", e))?;
            }
        }
        Ok(())
    }

    /// Store root
    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    /// Path resolver for this store
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Layout version on disk (always current once open)
    pub fn layout_version(&self) -> u32 {
        self.manifest.layout_version
    }

    /// Store identifier from the MANIFEST
    pub fn store_uuid(&self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.manifest.store_uuid)
    }

    /// Durability applied to every table opened here
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Whether the namespace's directory is in place
    pub fn namespace_exists(&self, namespace: &NamespaceId) -> bool {
        self.paths.log_file(namespace).exists()
    }

    /// Provision an account namespace.
    ///
    /// Returns `false` if it already existed.
    pub fn create_namespace(&self, account: &AccountId) -> Result<bool> {
        let namespace = NamespaceId::Account(account.clone());
        if self.namespace_exists(&namespace) {
            return Ok(false);
        }
        let target = self.paths.namespace_dir(&namespace);
        let staging = self.paths.creating_dir(account);

        let built = (|| -> std::result::Result<(), String> {
            if staging.exists() {
                fs::remove_dir_all(&staging).map_err(|e| format!("clearing staging: {}", e))?;
            }
            fs::create_dir(&staging).map_err(|e| format!("creating staging: {}", e))?;
            let mut marker = File::create(staging.join(NAMESPACE_FILE))
                .map_err(|e| format!("writing NAMESPACE: {}", e))?;
            marker
                .write_all(account.as_str().as_bytes())
                .and_then(|_| marker.sync_all())
                .map_err(|e| format!("writing NAMESPACE: {}", e))?;
            RecordLog::create(&staging.join(paths::LOG_FILE), self.durability)
                .map_err(|e| format!("creating log: {}", e))?;
            sync_parent(&staging.join(paths::LOG_FILE)).map_err(|e| e.to_string())?;
            fs::rename(&staging, &target).map_err(|e| format!("publishing namespace: {}", e))?;
            sync_parent(&target).map_err(|e| e.to_string())
        })();

        if let Err(reason) = built {
            let _ = fs::remove_dir_all(&staging);
            return Err(SchemaError::ProvisioningFailed {
                namespace: namespace.to_string(),
                reason,
            }
            .into());
        }
        info!(target: "doccache::schema", namespace = %namespace, "Created account namespace");
        Ok(true)
    }

    /// Tear down an account namespace and every record in it.
    ///
    /// Returns `false` if it did not exist.
    pub fn destroy_namespace(&self, account: &AccountId) -> Result<bool> {
        let namespace = NamespaceId::Account(account.clone());
        let target = self.paths.namespace_dir(&namespace);
        if !target.exists() {
            return Ok(false);
        }

        let trash = self.paths.deleting_dir();
        fs::rename(&target, &trash).map_err(|e| SchemaError::ProvisioningFailed {
            namespace: namespace.to_string(),
            reason: format!("moving namespace aside: {}", e),
        })?;
        if let Err(e) = sync_parent(&trash) {
            warn!(target: "doccache::schema", namespace = %namespace, error = %e, "Failed to sync accounts directory");
        }
        // The namespace is gone once the rename lands; a failed removal is retried on open.
        if let Err(e) = fs::remove_dir_all(&trash) {
            warn!(target: "doccache::schema", namespace = %namespace, error = %e, "Deferred removal of namespace files");
        }
        info!(target: "doccache::schema", namespace = %namespace, "Destroyed account namespace");
        Ok(true)
    }

    /// Accounts with a provisioned namespace, sorted.
    pub fn list_account_namespaces(&self) -> Result<Vec<AccountId>> {
        let listing = fs::read_dir(self.paths.accounts_dir())
            .map_err(|e| Error::io("listing account namespaces", e))?;
        let mut accounts = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|e| Error::io("listing account namespaces", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_account_dir_name(&name) {
                Some(account) => accounts.push(account),
                None if name.contains('.') => {}
                None => {
                    debug!(target: "doccache::schema", directory = %name, "Ignoring unrecognized directory");
                }
            }
        }
        accounts.sort();
        Ok(accounts)
    }

    /// Replay a namespace's log into a table.
    pub fn open_table(&self, namespace: &NamespaceId, compaction_ratio: f64) -> Result<DocumentTable> {
        if !self.namespace_exists(namespace) {
            return Err(SchemaError::NamespaceNotReady {
                namespace: namespace.to_string(),
            }
            .into());
        }
        DocumentTable::open(
            namespace.clone(),
            &self.paths.log_file(namespace),
            self.durability,
            compaction_ratio,
        )
    }
}
