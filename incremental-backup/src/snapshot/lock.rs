//! Advisory lock next to the metadata file.
//!
//! Held for the whole run, from loading the previous snapshot to saving the
//! new one. A second run against the same metadata location fails to start
//! instead of racing on the file.

use crate::utils::{BackupError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

/// Guard for the metadata lock; released on drop
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    #[cfg(unix)]
    _guard: Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl StoreLock {
    /// Lock file path for a metadata path (`<metadata>.lock`)
    pub fn lock_path(metadata_path: &Path) -> PathBuf {
        let mut name = metadata_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        metadata_path.with_file_name(name)
    }

    pub fn acquire(metadata_path: &Path) -> Result<Self> {
        let path = Self::lock_path(metadata_path);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| {
                BackupError::Config(format!(
                    "metadata location {} is not writable: {}",
                    path.display(),
                    e
                ))
            })?;

        #[cfg(unix)]
        let lock = {
            let guard = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
                if errno == Errno::EWOULDBLOCK {
                    BackupError::Lock(format!(
                        "another backup run holds {}",
                        path.display()
                    ))
                } else {
                    BackupError::Lock(format!("cannot lock {}: {}", path.display(), errno))
                }
            })?;
            Self { path, _guard: guard }
        };

        #[cfg(not(unix))]
        let lock = {
            tracing::warn!("Advisory locking is not supported on this platform");
            Self { path, _file: file }
        };

        debug!("Acquired metadata lock {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
