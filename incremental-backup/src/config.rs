//! Configuration management for the backup tool.
//!
//! Loads configuration from an optional TOML file, then applies environment
//! variable overrides. Every field has a default, so an empty file (or no
//! file at all) is a valid configuration.

use crate::snapshot::store::{SnapshotStore, DEFAULT_METADATA_FILE};
use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `store.metadata_path`
pub const ENV_METADATA_PATH: &str = "BACKUP_METADATA_PATH";

/// Environment variable overriding `log.level`
pub const ENV_LOG_LEVEL: &str = "BACKUP_LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub scan: ScanConfig,
    pub compare: CompareConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Metadata file shared by every run (default: `~/backup_metadata.json`)
    pub metadata_path: Option<PathBuf>,

    /// Hold an advisory lock on the metadata file during a run
    pub lock: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Descend into symlinked directories
    pub follow_links: bool,

    /// Skip entries whose file name contains one of these substrings
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Consider files with unchanged size and mtime unchanged without hashing
    pub quick_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            metadata_path: None,
            lock: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise defaults; then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_METADATA_PATH).filter(|v| !v.is_empty()) {
            self.store.metadata_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.log.level = level;
        }
    }

    /// Resolved metadata location
    pub fn metadata_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store.metadata_path {
            return Ok(path.clone());
        }

        SnapshotStore::default_path().ok_or_else(|| {
            BackupError::Config(format!(
                "no home directory found; set {} or store.metadata_path to place {}",
                ENV_METADATA_PATH, DEFAULT_METADATA_FILE
            ))
        })
    }
}
