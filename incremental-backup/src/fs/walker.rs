//! Directory traversal for backup scans.
//!
//! Produces every regular file under a root together with its canonical
//! relative key, size and mtime. Entries that cannot be read as a byte
//! stream are skipped and returned alongside the files so the caller can
//! report them.

use crate::fs::metadata::FileStat;
use crate::fs::paths::relative_key;
use crate::utils::{BackupError, Result};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links to directories
    pub follow_links: bool,

    /// Exclude entries whose file name contains one of these substrings
    pub exclude_patterns: Vec<String>,

    /// Absolute paths pruned from the walk (destination, metadata file)
    pub skip_paths: Vec<PathBuf>,
}

/// A regular file discovered during the scan
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root, as a filesystem path
    pub relative_path: PathBuf,

    /// Canonical snapshot key
    pub key: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified time (fractional epoch seconds)
    pub mtime: f64,
}

/// An entry the walk could not treat as a regular file
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a directory walk
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub skipped: Vec<SkippedEntry>,
}

impl ScanOutcome {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Walk a directory tree and collect all regular files.
///
/// Fails only when the root itself cannot be read. Errors below the root
/// end up in [`ScanOutcome::skipped`].
pub fn walk_directory(root: &Path, options: &WalkOptions) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome::default();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !should_exclude(entry, options));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(BackupError::Walk(e)),
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                outcome.skipped.push(SkippedEntry {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        match scanned_file(&entry, root) {
            Ok(Some(file)) => outcome.files.push(file),
            Ok(None) => {}
            Err(reason) => outcome.skipped.push(SkippedEntry {
                path: entry.path().to_path_buf(),
                reason,
            }),
        }
    }

    Ok(outcome)
}

/// Turn a non-directory entry into a `ScannedFile`.
///
/// Symlinks are resolved: a link to a regular file is backed up as that
/// file, anything else is rejected with a reason.
fn scanned_file(entry: &DirEntry, root: &Path) -> std::result::Result<Option<ScannedFile>, String> {
    let path = entry.path();

    let metadata = if entry.path_is_symlink() {
        match std::fs::metadata(path) {
            Ok(resolved) if resolved.is_file() => resolved,
            Ok(resolved) if resolved.is_dir() => {
                return Err("symlink to a directory is not followed".to_string());
            }
            Ok(_) => return Err("symlink target is not a regular file".to_string()),
            Err(e) => return Err(format!("broken symlink: {}", e)),
        }
    } else {
        let metadata = entry.metadata().map_err(|e| e.to_string())?;
        if !metadata.is_file() {
            return Err("not a regular file".to_string());
        }
        metadata
    };

    let Some(key) = relative_key(path, root) else {
        return Ok(None);
    };
    let stat = FileStat::from_metadata(&metadata).map_err(|e| e.to_string())?;
    let relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();

    Ok(Some(ScannedFile {
        path: path.to_path_buf(),
        relative_path,
        key,
        size: stat.size,
        mtime: stat.mtime,
    }))
}

/// Check if a directory entry should be excluded
fn should_exclude(entry: &DirEntry, options: &WalkOptions) -> bool {
    if options.skip_paths.iter().any(|p| p == entry.path()) {
        return true;
    }

    let file_name = entry.file_name().to_string_lossy();
    options
        .exclude_patterns
        .iter()
        .any(|pattern| file_name.contains(pattern.as_str()))
}
