//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Controller settings
    pub controller: ControllerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// An explicit path must load and validate. Implicit candidates that are
    /// missing, unreadable or invalid are skipped in favor of the next one.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations in priority order: ./.vrpc.yml, then the
    /// user config dir
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".vrpc.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("vrpc").join("vrpc.yml"));
        }
        paths
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.controller.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Default timeout for sync calls in milliseconds
    #[serde(rename = "default-timeout-ms", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Max sync calls awaiting a result at once
    #[serde(rename = "max-pending-calls", default = "default_max_pending_calls")]
    pub max_pending_calls: usize,
}

fn default_timeout_ms() -> u64 {
    debug!("default_timeout_ms: called");
    1000
}

fn default_max_pending_calls() -> usize {
    debug!("default_max_pending_calls: called");
    10_000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        debug!("ControllerConfig::default: called");
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_pending_calls: default_max_pending_calls(),
        }
    }
}

impl ControllerConfig {
    /// Reject settings under which no sync call could ever succeed
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            bail!("default-timeout-ms must be greater than 0");
        }
        if self.max_pending_calls == 0 {
            bail!("max-pending-calls must be greater than 0");
        }
        Ok(())
    }

    /// Get the default timeout as a Duration
    pub fn default_timeout(&self) -> Duration {
        debug!(default_timeout_ms = %self.default_timeout_ms, "ControllerConfig::default_timeout: called");
        Duration::from_millis(self.default_timeout_ms)
    }
}
