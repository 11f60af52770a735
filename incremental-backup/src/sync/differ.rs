//! Change detection between the previous snapshot and a fresh scan.
//!
//! Every scanned path lands in exactly one of new, modified or unchanged;
//! snapshot paths that are no longer on disk are listed as deleted. Content
//! hashes decide: a file whose bytes are identical to the recorded hash is
//! unchanged even if its mtime moved.

use crate::fs::metadata::same_instant;
use crate::fs::ScannedFile;
use crate::snapshot::FileRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use tracing::debug;

/// Comparison settings
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Treat equal size and mtime as unchanged without hashing
    pub quick_check: bool,
}

/// Result of classifying a scan against a snapshot
#[derive(Debug, Default)]
pub struct Classification {
    /// In the scan, not in the snapshot
    pub new_paths: BTreeSet<String>,

    /// In both, with different content or size. Also holds files that could
    /// not be hashed (listed in `hash_errors`): they cannot be shown to be
    /// unchanged, so they stay due for copy.
    pub modified_paths: BTreeSet<String>,

    /// In both, with identical content and size
    pub unchanged_paths: BTreeSet<String>,

    /// In the snapshot, not in the scan. Reported only.
    pub deleted_paths: BTreeSet<String>,

    /// Records for files that were hashed during comparison
    pub current_records: BTreeMap<String, FileRecord>,

    /// Files whose content could not be read, with the error. Each one is
    /// also in `modified_paths`.
    pub hash_errors: BTreeMap<String, String>,
}

impl Classification {
    /// New and modified paths, in path order
    pub fn to_copy(&self) -> BTreeSet<String> {
        self.new_paths.union(&self.modified_paths).cloned().collect()
    }

    /// Number of scanned paths that were classified
    pub fn classified_count(&self) -> usize {
        self.new_paths.len() + self.modified_paths.len() + self.unchanged_paths.len()
    }
}

/// Classify `current` against the `previous` snapshot entries.
///
/// `hasher` is called lazily: only for paths present in both with equal
/// size (and, with quick check on, a different mtime). Files whose size
/// changed are modified without reading them. A file that cannot be hashed
/// is counted as modified, since it cannot be shown to be unchanged, and its
/// error is kept in [`Classification::hash_errors`].
pub fn classify<H>(
    previous: &BTreeMap<String, FileRecord>,
    current: &BTreeMap<String, ScannedFile>,
    options: DiffOptions,
    mut hasher: H,
) -> Classification
where
    H: FnMut(&Path) -> io::Result<String>,
{
    let mut result = Classification::default();

    for (key, file) in current {
        let Some(recorded) = previous.get(key) else {
            result.new_paths.insert(key.clone());
            continue;
        };

        if recorded.size_bytes != file.size {
            debug!("Modified (size {} -> {}): {}", recorded.size_bytes, file.size, key);
            result.modified_paths.insert(key.clone());
            continue;
        }

        if options.quick_check && same_instant(recorded.modified_at, file.mtime) {
            result.unchanged_paths.insert(key.clone());
            continue;
        }

        match hasher(&file.path) {
            Ok(hash) => {
                if hash == recorded.content_hash {
                    result.unchanged_paths.insert(key.clone());
                } else {
                    debug!("Modified (content): {}", key);
                    result.modified_paths.insert(key.clone());
                }
                result
                    .current_records
                    .insert(key.clone(), FileRecord::new(hash, file.size, file.mtime));
            }
            Err(e) => {
                debug!("Cannot hash {}: {}", key, e);
                result.modified_paths.insert(key.clone());
                result.hash_errors.insert(key.clone(), e.to_string());
            }
        }
    }

    result.deleted_paths = previous
        .keys()
        .filter(|key| !current.contains_key(*key))
        .cloned()
        .collect();

    result
}
