//! Store configuration via `doccache.toml`
//!
//! On first open, a default `doccache.toml` is written to the store
//! directory. To change settings, edit the file and reopen the store, or
//! pass a [`StoreConfig`] to `DocumentStore::open_with_config`, which writes
//! it back so later opens pick up the same settings.

use doccache_core::{DeviceTimeToLive, Error, Result};
use doccache_storage::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "doccache.toml";

/// Store configuration loaded from `doccache.toml`.
///
/// # Example
///
/// ```toml
/// durability = "always"
/// sweep_interval_ms = 60000
/// compaction_ratio = 0.5
/// auto_create_namespaces = true
/// default_ttl_secs = 86400
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Durability mode: `"always"` or `"buffered"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Milliseconds between background expiration sweeps; 0 disables the sweeper.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Share of dead log frames that triggers a log rewrite.
    #[serde(default = "default_compaction_ratio")]
    pub compaction_ratio: f64,
    /// Provision an account namespace on the first upsert naming it.
    #[serde(default = "default_auto_create")]
    pub auto_create_namespaces: bool,
    /// Device time-to-live for upserts without explicit options; 0 keeps rows forever.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_durability_str() -> String {
    "always".to_string()
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_compaction_ratio() -> f64 {
    0.5
}

fn default_auto_create() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    86_400
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            sweep_interval_ms: default_sweep_interval_ms(),
            compaction_ratio: default_compaction_ratio(),
            auto_create_namespaces: default_auto_create(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl StoreConfig {
    /// Set the durability spelling (`"always"` / `"buffered"`)
    pub fn with_durability(mut self, durability: impl Into<String>) -> Self {
        self.durability = durability.into();
        self
    }

    /// Set the sweep interval; `Duration::ZERO` disables the sweeper
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the compaction trigger ratio
    pub fn with_compaction_ratio(mut self, ratio: f64) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    /// Enable or disable namespace auto-provisioning
    pub fn with_auto_create_namespaces(mut self, enabled: bool) -> Self {
        self.auto_create_namespaces = enabled;
        self
    }

    /// Set the default time-to-live in seconds (0 = no expiry)
    pub fn with_default_ttl_secs(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"always"` or `"buffered"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        DurabilityMode::parse(&self.durability).ok_or_else(|| {
            Error::Config(format!(
                "Invalid durability mode '{}' in {}. Expected \"always\" or \"buffered\".",
                self.durability, CONFIG_FILE_NAME
            ))
        })
    }

    /// Background sweep interval, `None` when disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.sweep_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Time-to-live applied to upserts without explicit options
    pub fn default_time_to_live(&self) -> DeviceTimeToLive {
        match self.default_ttl_secs {
            0 => DeviceTimeToLive::NoExpiry,
            secs => DeviceTimeToLive::For(Duration::from_secs(secs)),
        }
    }

    /// Check every value.
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "compaction_ratio must be in (0, 1], got {}",
                self.compaction_ratio
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# doccache store configuration
#
# Durability mode: "always" (default) or "buffered"
#   "always"   = fsync every upsert/delete, nothing lost on power failure
#   "buffered" = OS-buffered writes, recent writes may be lost on power failure
durability = "always"

# Milliseconds between background expiration sweeps (0 disables the sweeper).
# Expired rows are hidden from reads either way.
sweep_interval_ms = 60000

# Rewrite a namespace log once this share of its frames is dead.
compaction_ratio = 0.5

# Create an account namespace on the first upsert naming the account.
# When false, call create_account_namespace first.
auto_create_namespaces = true

# Device time-to-live for upserts without explicit options, in seconds.
# 0 keeps rows until they are removed.
default_ttl_secs = 86400
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("reading config file '{}'", path.display()), e)
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::io(format!("writing default config file '{}'", path.display()), e)
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| Error::io(format!("writing config file '{}'", path.display()), e))
    }
}
