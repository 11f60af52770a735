//! Run report handed to the presentation layer.
//!
//! The report carries everything a run decided and did: counts, the sorted
//! path lists, per-file failures and recovered warnings. `Display` renders
//! the console form; `Serialize` backs `--json`.

use crate::snapshot::BackupType;
use crate::sync::differ::Classification;
use crate::transfer::progress::{format_bytes, format_duration};
use serde::Serialize;
use std::fmt;

const RULE: &str = "======================================================================";

/// Where a per-file problem happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Scan,
    Hash,
    Copy,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Scan => write!(f, "scan"),
            FailureStage::Hash => write!(f, "hash"),
            FailureStage::Copy => write!(f, "copy"),
        }
    }
}

/// A file that was skipped or could not be backed up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one backup run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub destination: String,
    pub metadata_path: String,
    pub backup_type: BackupType,

    pub total_source_files: usize,
    pub files_in_previous_backup: usize,
    pub new_count: usize,
    pub modified_count: usize,
    /// Previously recorded files whose content could not be read this run
    pub unreadable_count: usize,
    pub unchanged_count: usize,
    pub deleted_count: usize,
    pub copied_count: usize,
    pub failed_count: usize,
    pub copied_bytes: u64,

    pub new_paths: Vec<String>,
    pub modified_paths: Vec<String>,
    pub unreadable_paths: Vec<String>,
    pub deleted_paths: Vec<String>,

    /// Hash and copy failures; these files are not recorded as backed up
    pub failures: Vec<FileFailure>,

    /// Entries the scan could not treat as regular files
    pub skipped: Vec<FileFailure>,

    /// Recovered problems (unreadable metadata, failed save, empty source)
    pub warnings: Vec<String>,

    pub snapshot_saved: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(source: String, destination: String, metadata_path: String) -> Self {
        Self {
            source,
            destination,
            metadata_path,
            backup_type: BackupType::Full,
            total_source_files: 0,
            files_in_previous_backup: 0,
            new_count: 0,
            modified_count: 0,
            unreadable_count: 0,
            unchanged_count: 0,
            deleted_count: 0,
            copied_count: 0,
            failed_count: 0,
            copied_bytes: 0,
            new_paths: Vec::new(),
            modified_paths: Vec::new(),
            unreadable_paths: Vec::new(),
            deleted_paths: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            snapshot_saved: false,
            duration_ms: 0,
        }
    }

    pub fn to_copy_count(&self) -> usize {
        self.new_count + self.modified_count + self.unreadable_count
    }

    /// Fill counts and path lists from a classification.
    ///
    /// Files that could not be hashed are kept apart from the modified list:
    /// nothing shows that their content changed.
    pub fn record_analysis(&mut self, classification: &Classification) {
        let (unreadable, modified): (Vec<String>, Vec<String>) = classification
            .modified_paths
            .iter()
            .cloned()
            .partition(|key| classification.hash_errors.contains_key(key));

        self.new_paths = classification.new_paths.iter().cloned().collect();
        self.modified_paths = modified;
        self.unreadable_paths = unreadable;
        self.deleted_paths = classification.deleted_paths.iter().cloned().collect();

        self.new_count = self.new_paths.len();
        self.modified_count = self.modified_paths.len();
        self.unreadable_count = self.unreadable_paths.len();
        self.unchanged_count = classification.unchanged_paths.len();
        self.deleted_count = self.deleted_paths.len();
    }

    pub fn record_failure(&mut self, path: &str, stage: FailureStage, error: impl ToString) {
        self.failures.push(FileFailure {
            path: path.to_string(),
            stage,
            error: error.to_string(),
        });
        self.failed_count = self.failures.len();
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "INCREMENTAL BACKUP")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Source:      {}", self.source)?;
        writeln!(f, "Destination: {}", self.destination)?;
        writeln!(f, "Mode:        {}", self.backup_type)?;
        writeln!(f, "Metadata:    {}", self.metadata_path)?;
        writeln!(f, "{RULE}")?;

        writeln!(f)?;
        writeln!(f, "ANALYSIS")?;
        writeln!(f, "Total files in source:   {}", self.total_source_files)?;
        writeln!(f, "Files in last backup:    {}", self.files_in_previous_backup)?;
        writeln!(f, "New files:               {}", self.new_count)?;
        writeln!(f, "Modified files:          {}", self.modified_count)?;
        if self.unreadable_count > 0 {
            writeln!(f, "Unreadable files:        {}", self.unreadable_count)?;
        }
        writeln!(f, "Unchanged files:         {}", self.unchanged_count)?;
        writeln!(f, "Deleted files:           {}", self.deleted_count)?;
        writeln!(f, "Files to copy:           {}", self.to_copy_count())?;

        write_list(f, "New files:", "+", &self.new_paths)?;
        write_list(f, "Modified files:", "M", &self.modified_paths)?;
        write_list(
            f,
            "Could not be read (not compared, see failures):",
            "!",
            &self.unreadable_paths,
        )?;
        write_list(
            f,
            "Deleted from source (NOT removed from destination):",
            "-",
            &self.deleted_paths,
        )?;

        writeln!(f)?;
        writeln!(f, "COPY")?;
        if self.to_copy_count() == 0 {
            writeln!(f, "Nothing to copy (no changes detected).")?;
        } else {
            writeln!(
                f,
                "{} files copied ({}), {} failed, in {}",
                self.copied_count,
                format_bytes(self.copied_bytes),
                self.failed_count,
                format_duration(self.duration_ms / 1000)
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures:")?;
            for failure in &self.failures {
                writeln!(f, "  ! {} [{}]: {}", failure.path, failure.stage, failure.error)?;
            }
        }

        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped:")?;
            for entry in &self.skipped {
                writeln!(f, "  ? {}: {}", entry.path, entry.error)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  * {}", warning)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{RULE}")?;
        if self.snapshot_saved {
            writeln!(f, "BACKUP COMPLETED")?;
        } else {
            writeln!(f, "BACKUP COMPLETED (metadata not updated)")?;
        }
        write!(f, "{RULE}")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, marker: &str, paths: &[String]) -> fmt::Result {
    if paths.is_empty() {
        return Ok(());
    }

    writeln!(f)?;
    writeln!(f, "{}", title)?;
    for path in paths {
        writeln!(f, "  {} {}", marker, path)?;
    }
    Ok(())
}
