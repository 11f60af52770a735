//! Filesystem helpers: scanning, per-file metadata and relative-path keys.

pub mod metadata;
pub mod paths;
pub mod walker;

pub use metadata::FileStat;
pub use walker::{walk_directory, ScanOutcome, ScannedFile, SkippedEntry, WalkOptions};
