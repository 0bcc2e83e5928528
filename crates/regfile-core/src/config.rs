//! Configuration for regfile-core
//!
//! Module settings live in the `[general]` section of the profile file,
//! next to the identity sections:
//!
//! ```toml
//! [general]
//! autocreate = false
//! file = "/var/lib/regfile/accounts.toml"
//!
//! [alice]
//! password = "secret"
//! alternatives = "sales"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{RegistrarError, Result};
use crate::registrar::IdentityDirectory;
use crate::sections::sections_from_table;
use crate::types::RESERVED_IDENTITY;

/// Main configuration for the registrar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegfileConfig {
    /// Accept registrations from identities without a profile
    #[serde(default, rename = "autocreate")]
    pub auto_create: bool,

    /// Registration file; registrations are kept in memory only when unset
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Background sweep period (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Host timer ticks between two sweeps
    #[serde(default = "default_ticks_per_sweep")]
    pub ticks_per_sweep: u32,

    /// Smallest accepted non-zero lifetime (seconds, 0 = no floor)
    #[serde(default)]
    pub min_expires: u32,

    /// Largest accepted lifetime (seconds, 0 = no cap)
    #[serde(default)]
    pub max_expires: u32,

    /// Save registrations after every register and unregister
    #[serde(default = "default_true")]
    pub persist_on_change: bool,
}

impl Default for RegfileConfig {
    fn default() -> Self {
        Self {
            auto_create: false,
            file: None,
            sweep_interval_secs: default_sweep_interval(),
            ticks_per_sweep: default_ticks_per_sweep(),
            min_expires: 0,
            max_expires: 0,
            persist_on_change: true,
        }
    }
}

impl RegfileConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Apply the configured bounds to a requested lifetime
    ///
    /// Zero is passed through untouched: it always means "never expires".
    pub fn clamp_ttl(&self, ttl_secs: u32) -> u32 {
        if ttl_secs == 0 {
            return 0;
        }
        let mut ttl = ttl_secs;
        if self.min_expires != 0 && ttl < self.min_expires {
            ttl = self.min_expires;
        }
        if self.max_expires != 0 && ttl > self.max_expires {
            ttl = self.max_expires;
        }
        ttl
    }

    /// Check settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(RegistrarError::ConfigError(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.ticks_per_sweep == 0 {
            return Err(RegistrarError::ConfigError(
                "ticks_per_sweep must be greater than zero".to_string(),
            ));
        }
        if self.max_expires != 0 && self.min_expires > self.max_expires {
            return Err(RegistrarError::ConfigError(format!(
                "min_expires ({}) exceeds max_expires ({})",
                self.min_expires, self.max_expires
            )));
        }
        Ok(())
    }
}

// Default value helpers
fn default_true() -> bool { true }
fn default_sweep_interval() -> u64 { 30 }
fn default_ticks_per_sweep() -> u32 { 30 }

/// A parsed profile file: module settings plus the identity directory
#[derive(Debug, Clone)]
pub struct ProfileFile {
    pub config: RegfileConfig,
    pub directory: IdentityDirectory,
}

impl ProfileFile {
    /// Parse profile file contents
    pub fn parse(text: &str) -> Result<Self> {
        let mut table: toml::Table = text.parse()?;

        let config = match table.remove(RESERVED_IDENTITY) {
            Some(general) => general.try_into::<RegfileConfig>()?,
            None => RegfileConfig::default(),
        };
        config.validate()?;

        let directory = IdentityDirectory::from_sections(sections_from_table(table)?);
        debug!("Parsed {} identity profiles", directory.len());

        Ok(Self { config, directory })
    }

    /// Read and parse a profile file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RegistrarError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }
}

/// Builder for RegfileConfig
pub struct RegfileConfigBuilder {
    config: RegfileConfig,
}

impl RegfileConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RegfileConfig::default(),
        }
    }

    pub fn auto_create(mut self, enabled: bool) -> Self {
        self.config.auto_create = enabled;
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file = Some(path.into());
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    pub fn ticks_per_sweep(mut self, ticks: u32) -> Self {
        self.config.ticks_per_sweep = ticks;
        self
    }

    pub fn expires_bounds(mut self, min: u32, max: u32) -> Self {
        self.config.min_expires = min;
        self.config.max_expires = max;
        self
    }

    pub fn persist_on_change(mut self, enabled: bool) -> Self {
        self.config.persist_on_change = enabled;
        self
    }

    pub fn build(self) -> RegfileConfig {
        self.config
    }
}

impl Default for RegfileConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
