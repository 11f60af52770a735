//! Durable storage for the snapshot.
//!
//! The snapshot lives in a single JSON file shared by every run on the
//! machine. Loading never fails a run: a missing or damaged file means "no
//! previous backup". Saving goes through a temporary file in the same
//! directory and a rename, so the old file is either fully replaced or left
//! as it was.

use super::lock::StoreLock;
use super::Snapshot;
use crate::utils::{BackupError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name used under the home directory when no location is configured
pub const DEFAULT_METADATA_FILE: &str = "backup_metadata.json";

/// What `load` found at the metadata location
#[derive(Debug)]
pub enum LoadOutcome {
    /// No metadata file exists yet
    Missing,
    /// A valid snapshot was read
    Loaded(Snapshot),
    /// A file exists but could not be read or parsed
    Unusable(String),
}

impl LoadOutcome {
    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            LoadOutcome::Loaded(snapshot) => Some(snapshot),
            LoadOutcome::Missing | LoadOutcome::Unusable(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/backup_metadata.json`, if a home directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_METADATA_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the metadata location can be written to.
    ///
    /// Creates the parent directory if needed and checks that a file can be
    /// created next to the metadata file. A failure here is a configuration
    /// problem: the run must not start.
    pub fn prepare(&self) -> Result<()> {
        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent).map_err(|e| {
                BackupError::Config(format!(
                    "metadata directory {} cannot be created: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        if self.path.is_dir() {
            return Err(BackupError::Config(format!(
                "metadata location {} is a directory",
                self.path.display()
            )));
        }

        let probe = self.temp_path();
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|e| {
                BackupError::Config(format!(
                    "metadata location {} is not writable: {}",
                    self.path.display(),
                    e
                ))
            })?;

        Ok(())
    }

    /// Take the advisory lock that keeps two runs off the same snapshot.
    pub fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.path)
    }

    /// Read the stored snapshot.
    pub fn load(&self) -> LoadOutcome {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No metadata at {}", self.path.display());
                return LoadOutcome::Missing;
            }
            Err(e) => {
                warn!("Failed to read metadata {}: {}", self.path.display(), e);
                return LoadOutcome::Unusable(format!("cannot read {}: {}", self.path.display(), e));
            }
        };

        match serde_json::from_slice::<Snapshot>(&content) {
            Ok(mut snapshot) => {
                let dropped = snapshot.normalize_keys();
                if dropped > 0 {
                    warn!("{} duplicate snapshot entries dropped after path normalization", dropped);
                }
                info!(
                    "Loaded snapshot from {}: {} files, last backup {}",
                    self.path.display(),
                    snapshot.files.len(),
                    super::timestamp::format(&snapshot.last_backup_at)
                );
                LoadOutcome::Loaded(snapshot)
            }
            Err(e) => {
                warn!("Failed to parse metadata {}: {}", self.path.display(), e);
                LoadOutcome::Unusable(format!("cannot parse {}: {}", self.path.display(), e))
            }
        }
    }

    /// Replace the stored snapshot with `snapshot`.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let content = serde_json::to_vec_pretty(snapshot)?;

        self.write_atomic(&content).map_err(|source| BackupError::MetadataSave {
            path: self.path.clone(),
            source,
        })?;

        info!(
            "Saved snapshot to {} ({} files)",
            self.path.display(),
            snapshot.files.len()
        );
        Ok(())
    }

    fn write_atomic(&self, content: &[u8]) -> io::Result<()> {
        let temp_path = self.temp_path();

        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(content)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }

        result
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_METADATA_FILE.to_string());
        let temp_name = format!(".{}.{}.tmp", file_name, Uuid::new_v4());

        match self.parent_dir() {
            Some(parent) => parent.join(temp_name),
            None => PathBuf::from(temp_name),
        }
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}
