//! Store configuration
//!
//! Loaded from a JSON file. Only `data_dir` is required; every other key
//! falls back to a default. Values are validated once at load time.
//!
//! ```json
//! { "data_dir": "./data", "journal_mode": "WAL", "log_level": "info" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
const SYNCHRONOUS_MODES: &[&str] = &["OFF", "NORMAL", "FULL", "EXTRA"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "DOC_CONFIG_READ",
            ConfigError::Parse(_) => "DOC_CONFIG_PARSE",
            ConfigError::Invalid(_) => "DOC_CONFIG_INVALID",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<name>.sqlite` file per database (required)
    pub data_dir: PathBuf,

    /// SQLite journal mode (default "WAL")
    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,

    /// SQLite synchronous level (default "NORMAL")
    #[serde(default = "default_synchronous")]
    pub synchronous: String,

    /// SQLite page cache; negative values are KiB (default -100000)
    #[serde(default = "default_cache_size")]
    pub cache_size_kib: i64,

    /// Busy handler timeout in milliseconds (default 5000)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Minimum log severity (default "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_journal_mode() -> String {
    "WAL".to_string()
}
fn default_synchronous() -> String {
    "NORMAL".to_string()
}
fn default_cache_size() -> i64 {
    -100000
}
fn default_busy_timeout() -> u64 {
    5000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl StoreConfig {
    /// Defaults rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            journal_mode: default_journal_mode(),
            synchronous: default_synchronous(),
            cache_size_kib: default_cache_size(),
            busy_timeout_ms: default_busy_timeout(),
            log_level: default_log_level(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks every value against the allowed set
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }

        if !JOURNAL_MODES.contains(&self.journal_mode.to_ascii_uppercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "journal_mode '{}' must be one of {}",
                self.journal_mode,
                JOURNAL_MODES.join(", ")
            )));
        }

        if !SYNCHRONOUS_MODES.contains(&self.synchronous.to_ascii_uppercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "synchronous '{}' must be one of {}",
                self.synchronous,
                SYNCHRONOUS_MODES.join(", ")
            )));
        }

        if self.cache_size_kib == 0 {
            return Err(ConfigError::Invalid("cache_size_kib must be non-zero".into()));
        }

        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "log_level '{}' must be one of trace, info, warn, error, fatal",
                self.log_level
            ))
        })
    }
}
