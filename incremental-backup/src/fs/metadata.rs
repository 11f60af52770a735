//! File metadata used for change detection.
//!
//! Only size and modification time matter here. The mtime keeps its
//! sub-second part as fractional epoch seconds, which is the form stored in
//! the snapshot.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Size and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch, fractional)
    pub mtime: f64,
}

impl FileStat {
    /// Read size and mtime for a path, following symlinks.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Self::from_metadata(&metadata)
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            mtime: epoch_seconds(metadata.modified()?),
        })
    }
}

/// Convert a `SystemTime` into fractional seconds since the Unix epoch.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}

/// Two mtimes are the same instant if they agree to the microsecond.
pub fn same_instant(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
