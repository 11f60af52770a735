//! Custom error types for the backup engine.
//!
//! Only errors that end a run live here. Per-file problems (a file that
//! cannot be hashed or copied) are recorded in the run report instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Metadata lock error: {0}")]
    Lock(String),

    #[error("Failed to save metadata to {path}: {source}")]
    MetadataSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup cancelled")]
    Cancelled,
}

impl BackupError {
    /// Whether the error prevented the run from starting any work.
    pub fn is_config(&self) -> bool {
        matches!(self, BackupError::Config(_) | BackupError::Lock(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
