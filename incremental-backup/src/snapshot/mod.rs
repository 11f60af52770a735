//! Snapshot types for incremental backup support.
//!
//! A snapshot records every file of the most recent backup with its content
//! hash, size and mtime, plus where the backup came from and went to. There
//! is one snapshot per machine; each successful run replaces it.

pub mod lock;
pub mod store;
pub mod timestamp;

use crate::fs::paths::normalize_key;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

pub use lock::StoreLock;
pub use store::{LoadOutcome, SnapshotStore};

/// Kind of run that produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupType::Full => write!(f, "full"),
            BackupType::Incremental => write!(f, "incremental"),
        }
    }
}

/// One file as recorded in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Hex MD5 of the file content
    #[serde(rename = "hash")]
    pub content_hash: String,

    #[serde(rename = "size")]
    pub size_bytes: u64,

    /// Fractional seconds since the Unix epoch
    #[serde(rename = "mtime")]
    pub modified_at: f64,

    /// `modified_at` as ISO-8601 local time
    #[serde(rename = "mtime_readable")]
    pub modified_at_readable: String,
}

impl FileRecord {
    pub fn new(content_hash: String, size_bytes: u64, modified_at: f64) -> Self {
        Self {
            content_hash,
            size_bytes,
            modified_at,
            modified_at_readable: timestamp::iso_from_epoch(modified_at),
        }
    }
}

/// Persisted state of the most recent backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "last_backup", with = "timestamp::iso8601")]
    pub last_backup_at: DateTime<FixedOffset>,

    #[serde(rename = "source")]
    pub source_root: String,

    #[serde(rename = "destination")]
    pub destination_root: String,

    pub backup_type: BackupType,

    pub files: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    /// Rewrite every key into canonical form.
    ///
    /// Keys that collapse onto the same canonical path keep the entry that
    /// sorts last; the rest are dropped with a warning. Returns the number
    /// of dropped entries.
    pub fn normalize_keys(&mut self) -> usize {
        let original = std::mem::take(&mut self.files);
        let before = original.len();

        for (key, record) in original {
            let canonical = normalize_key(&key);
            if canonical != key {
                warn!("Normalized snapshot key {:?} to {:?}", key, canonical);
            }
            if canonical.is_empty() {
                warn!("Dropping snapshot entry with empty path {:?}", key);
                continue;
            }
            self.files.insert(canonical, record);
        }

        before - self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|r| r.size_bytes).sum()
    }
}
