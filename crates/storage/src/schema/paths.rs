//! Store directory structure
//!
//! ```text
//! <root>/
//! ├── MANIFEST
//! ├── default/documents.log
//! └── accounts/
//!     ├── <hex(account)>/
//!     │   ├── NAMESPACE
//!     │   └── documents.log
//!     ├── <hex>.creating/        # provisioning in progress
//!     └── .deleting-<uuid>/      # teardown in progress
//! ```
//!
//! Account directories are hex-encoded so any valid account id maps to a
//! portable, case-insensitive-safe file name.

use doccache_core::{AccountId, NamespaceId};
use std::path::{Path, PathBuf};

/// MANIFEST file name
pub const MANIFEST_FILE: &str = "MANIFEST";
/// Document log file name inside every namespace directory
pub const LOG_FILE: &str = "documents.log";
/// File holding the plain account id inside an account namespace
pub const NAMESPACE_FILE: &str = "NAMESPACE";
/// Directory of the default namespace
pub const DEFAULT_DIR: &str = "default";
/// Directory holding account namespaces
pub const ACCOUNTS_DIR: &str = "accounts";
/// Suffix of a namespace directory under construction
pub const CREATING_SUFFIX: &str = ".creating";
/// Prefix of a namespace directory being removed
pub const DELETING_PREFIX: &str = ".deleting-";
/// Prefix of account directories in the v1 layout
pub const LEGACY_ACCOUNT_PREFIX: &str = "user-";

/// Resolves every path of a store rooted at one directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Paths for a store at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// MANIFEST location
    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Directory holding account namespaces
    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join(ACCOUNTS_DIR)
    }

    /// Directory of a namespace
    pub fn namespace_dir(&self, namespace: &NamespaceId) -> PathBuf {
        match namespace {
            NamespaceId::Default => self.root.join(DEFAULT_DIR),
            NamespaceId::Account(account) => self.accounts_dir().join(account_dir_name(account)),
        }
    }

    /// Document log of a namespace
    pub fn log_file(&self, namespace: &NamespaceId) -> PathBuf {
        self.namespace_dir(namespace).join(LOG_FILE)
    }

    /// Staging directory used while provisioning an account namespace
    pub fn creating_dir(&self, account: &AccountId) -> PathBuf {
        self.accounts_dir()
            .join(format!("{}{}", account_dir_name(account), CREATING_SUFFIX))
    }

    /// Fresh trash directory for a namespace teardown
    pub fn deleting_dir(&self) -> PathBuf {
        self.accounts_dir()
            .join(format!("{}{}", DELETING_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    /// v1 location of the default namespace log
    pub fn legacy_default_log(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// v1 directory of an account namespace
    pub fn legacy_account_dir(&self, account: &AccountId) -> PathBuf {
        self.root
            .join(format!("{}{}", LEGACY_ACCOUNT_PREFIX, account_dir_name(account)))
    }
}

/// Directory name for an account namespace
pub fn account_dir_name(account: &AccountId) -> String {
    hex::encode(account.as_str().as_bytes())
}

/// Recover the account id from a namespace directory name.
///
/// Returns `None` for staging/trash directories and anything not produced by
/// [`account_dir_name`].
pub fn parse_account_dir_name(name: &str) -> Option<AccountId> {
    if name.is_empty() || name.contains('.') {
        return None;
    }
    let bytes = hex::decode(name).ok()?;
    let id = String::from_utf8(bytes).ok()?;
    AccountId::new(id).ok()
}
