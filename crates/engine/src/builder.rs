//! Store builder for fluent configuration
//!
//! ```ignore
//! use doccache_engine::DocumentStore;
//!
//! // 1. Simple open with settings from doccache.toml
//! let store = DocumentStore::open("/data/cache")?;
//!
//! // 2. Builder for programmatic settings, identity and clock
//! let store = DocumentStore::builder()
//!     .path("/data/cache")
//!     .buffered()
//!     .identity(context.clone())
//!     .open()?;
//! ```

use crate::config::StoreConfig;
use crate::store::DocumentStore;
use doccache_core::{Clock, Error, IdentityProvider, Result, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`DocumentStore`].
#[derive(Clone)]
pub struct StoreBuilder {
    path: Option<PathBuf>,
    config: StoreConfig,
    identity: Option<Arc<dyn IdentityProvider>>,
    clock: Arc<dyn Clock>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    /// Builder with default configuration and the system clock
    pub fn new() -> Self {
        Self {
            path: None,
            config: StoreConfig::default(),
            identity: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the store directory (required)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// fsync every write (default)
    pub fn always(mut self) -> Self {
        self.config.durability = "always".to_string();
        self
    }

    /// OS-buffered writes
    pub fn buffered(mut self) -> Self {
        self.config.durability = "buffered".to_string();
        self
    }

    /// Background sweep interval; `Duration::ZERO` disables the sweeper
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_sweep_interval(interval);
        self
    }

    /// Require explicit namespace creation before account writes
    pub fn manual_namespaces(mut self) -> Self {
        self.config.auto_create_namespaces = false;
        self
    }

    /// Identity provider consulted for account scoping and auditing
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Time source for expiration and `last_modified`
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open the store.
    ///
    /// The configuration is written to `doccache.toml` in the store directory.
    pub fn open(self) -> Result<DocumentStore> {
        let path = self
            .path
            .ok_or_else(|| Error::Config("store path is required".to_string()))?;
        DocumentStore::open_with_parts(&path, self.config, self.identity, self.clock)
    }
}

impl DocumentStore {
    /// Start building a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }
}
