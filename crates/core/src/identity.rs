//! Identity/history provider
//!
//! The store never owns identity state. It consumes an [`IdentityProvider`]
//! to learn who is signed in now and who was signed in at a given time.
//!
//! [`AccountIdContext`] is the provider used by applications: created at
//! startup with [`AccountIdContext::init`], fed by the sign-in layer through
//! [`AccountIdContext::set_account_id`], and shut down with
//! [`AccountIdContext::teardown`]. It is passed around as
//! `Arc<dyn IdentityProvider>`, never reached through a global.

use crate::error::{Error, Result};
use crate::timestamp::{Clock, Timestamp};
use crate::types::{AccountId, MAX_ACCOUNT_ID_LENGTH};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of account switches remembered
pub const MAX_ACCOUNT_HISTORY: usize = 5;

/// Prefix for custom identities in One Collector ids
pub const ONE_COLLECTOR_CUSTOM_PREFIX: &str = "c";

/// Read-only view of the signed-in account and its history.
pub trait IdentityProvider: Send + Sync {
    /// Account signed in right now
    fn current_account_id(&self) -> Option<AccountId>;

    /// Account that was signed in at `at`
    fn account_id_at(&self, at: Timestamp) -> Option<AccountId>;
}

/// Provider for devices with no sign-in layer: nobody is ever signed in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn current_account_id(&self) -> Option<AccountId> {
        None
    }

    fn account_id_at(&self, _at: Timestamp) -> Option<AccountId> {
        None
    }
}

/// One account switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdHistoryEntry {
    /// When the switch happened
    pub timestamp: Timestamp,
    /// Account signed in from then on (`None` = signed out)
    pub account_id: Option<AccountId>,
}

#[derive(Debug, Default)]
struct ContextState {
    active: bool,
    history: Vec<AccountIdHistoryEntry>,
}

/// Timestamped account history with explicit init/teardown.
pub struct AccountIdContext {
    clock: Arc<dyn Clock>,
    persist_path: Option<PathBuf>,
    state: RwLock<ContextState>,
}

impl AccountIdContext {
    /// Start an in-memory context with no account signed in.
    pub fn init(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            persist_path: None,
            state: RwLock::new(ContextState {
                active: true,
                history: Vec::new(),
            }),
        }
    }

    /// Start a context whose history is saved as JSON at `path`.
    ///
    /// An existing file is loaded; a missing file starts an empty history.
    pub fn init_persistent(clock: Arc<dyn Clock>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let history = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Vec<AccountIdHistoryEntry>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io("reading account history", e)),
        };
        debug!(target: "doccache::identity", path = ?path, entries = history.len(), "Loaded account history");
        Ok(Self {
            clock,
            persist_path: Some(path),
            state: RwLock::new(ContextState {
                active: true,
                history,
            }),
        })
    }

    /// Record a sign-in (`Some`) or sign-out (`None`) at the current time.
    ///
    /// Setting the account that is already current is a no-op.
    pub fn set_account_id(&self, account_id: Option<AccountId>) -> Result<()> {
        let mut state = self.state.write();
        if !state.active {
            return Err(Error::Closed);
        }
        let current = state.history.last().and_then(|e| e.account_id.clone());
        if !state.history.is_empty() && current == account_id {
            return Ok(());
        }
        state.history.push(AccountIdHistoryEntry {
            timestamp: self.clock.now(),
            account_id,
        });
        if state.history.len() > MAX_ACCOUNT_HISTORY {
            let excess = state.history.len() - MAX_ACCOUNT_HISTORY;
            state.history.drain(..excess);
        }
        self.persist(&state.history)
    }

    /// Forget past accounts, keeping only the current one.
    pub fn clear_history(&self) -> Result<()> {
        let mut state = self.state.write();
        let keep = state.history.pop();
        state.history.clear();
        state.history.extend(keep);
        self.persist(&state.history)
    }

    /// Snapshot of the history, oldest first.
    pub fn history(&self) -> Vec<AccountIdHistoryEntry> {
        self.state.read().history.clone()
    }

    /// Drop in-memory state at shutdown. The persisted file is left intact.
    pub fn teardown(&self) {
        let mut state = self.state.write();
        state.active = false;
        state.history.clear();
    }

    fn persist(&self, history: &[AccountIdHistoryEntry]) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(history)?;
        let temp_path = path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
        };
        write().map_err(|e| {
            warn!(target: "doccache::identity", path = ?path, error = %e, "Failed to persist account history");
            Error::io("writing account history", e)
        })
    }
}

impl IdentityProvider for AccountIdContext {
    fn current_account_id(&self) -> Option<AccountId> {
        let state = self.state.read();
        if !state.active {
            return None;
        }
        state.history.last().and_then(|e| e.account_id.clone())
    }

    fn account_id_at(&self, at: Timestamp) -> Option<AccountId> {
        let state = self.state.read();
        if !state.active {
            return None;
        }
        state
            .history
            .iter()
            .rev()
            .find(|entry| entry.timestamp <= at)
            .and_then(|entry| entry.account_id.clone())
    }
}

// ============================================================================
// Account id predicates
// ============================================================================

/// App Center accepts any id up to 256 characters (or no id).
pub fn is_valid_for_app_center(account_id: Option<&str>) -> bool {
    account_id.map_or(true, |id| id.chars().count() <= MAX_ACCOUNT_ID_LENGTH)
}

/// One Collector ids are non-empty and, when prefixed, use the `c:` prefix
/// followed by a non-empty id.
pub fn is_valid_for_one_collector(account_id: Option<&str>) -> bool {
    let Some(id) = account_id else {
        return true;
    };
    if id.is_empty() {
        return false;
    }
    match id.split_once(':') {
        Some((prefix, rest)) => prefix == ONE_COLLECTOR_CUSTOM_PREFIX && !rest.is_empty(),
        None => true,
    }
}

/// Add the `c:` prefix to ids that carry none.
pub fn prefixed_one_collector_id(account_id: &str) -> String {
    if account_id.contains(':') {
        account_id.to_string()
    } else {
        format!("{}:{}", ONE_COLLECTOR_CUSTOM_PREFIX, account_id)
    }
}
