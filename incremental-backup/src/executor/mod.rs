//! Backup executor - orchestrates one backup run.
//!
//! A run moves through fixed phases in order:
//! start, determine mode, load previous, scan, classify, copy, build
//! snapshot, persist. Any error that escapes a phase ends the run; per-file
//! problems are written to the report and the run carries on. The snapshot
//! is saved only after every copy has finished or failed.

pub mod report;

use crate::config::Config;
use crate::fs::walker::{walk_directory, ScannedFile, WalkOptions};
use crate::snapshot::{timestamp, BackupType, FileRecord, LoadOutcome, Snapshot, SnapshotStore};
use crate::sync::differ::{classify, DiffOptions};
use crate::sync::hasher::fingerprint;
use crate::transfer::copy::copy_file;
use crate::transfer::progress::{format_bytes, format_speed, CopyProgress};
use crate::utils::{BackupError, Result};
use report::{FailureStage, FileFailure, RunReport};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Phases of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    DetermineMode,
    LoadPrevious,
    ScanSource,
    Classify,
    Copy,
    BuildSnapshot,
    Persist,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::DetermineMode => "determine-mode",
            Phase::LoadPrevious => "load-previous",
            Phase::ScanSource => "scan-source",
            Phase::Classify => "classify",
            Phase::Copy => "copy",
            Phase::BuildSnapshot => "build-snapshot",
            Phase::Persist => "persist",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What to back up and where
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub force_full: bool,
}

/// Main backup executor
pub struct BackupExecutor {
    store: SnapshotStore,
    walk_options: WalkOptions,
    diff_options: DiffOptions,
    use_lock: bool,
    cancel_token: CancellationToken,
}

impl BackupExecutor {
    /// Create an executor for the given metadata store (no cancellation support)
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            walk_options: WalkOptions::default(),
            diff_options: DiffOptions::default(),
            use_lock: true,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Build an executor from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SnapshotStore::new(config.metadata_path()?);

        Ok(Self::new(store)
            .with_walk_options(WalkOptions {
                follow_links: config.scan.follow_links,
                exclude_patterns: config.scan.exclude_patterns.clone(),
                skip_paths: Vec::new(),
            })
            .with_diff_options(DiffOptions {
                quick_check: config.compare.quick_check,
            })
            .with_lock(config.store.lock))
    }

    pub fn with_walk_options(mut self, options: WalkOptions) -> Self {
        self.walk_options = options;
        self
    }

    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_options = options;
        self
    }

    pub fn with_lock(mut self, use_lock: bool) -> Self {
        self.use_lock = use_lock;
        self
    }

    /// Stop between files once `token` is cancelled
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Execute a backup job
    pub fn execute(&self, job: &BackupJob) -> Result<RunReport> {
        let started = std::time::Instant::now();
        let mut phase = Phase::Start;

        match self.run(job, &mut phase) {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Backup finished: {} copied, {} failed, {} unchanged, {} deleted in source",
                    report.copied_count, report.failed_count, report.unchanged_count, report.deleted_count
                );
                Ok(report)
            }
            Err(e) => {
                error!("Backup failed during {}: {}", phase, e);
                Err(e)
            }
        }
    }

    fn run(&self, job: &BackupJob, phase: &mut Phase) -> Result<RunReport> {
        let (source, destination) = resolve_roots(job)?;
        self.store.prepare()?;
        let _lock = if self.use_lock {
            Some(self.store.lock()?)
        } else {
            None
        };

        let mut report = RunReport::new(
            source.display().to_string(),
            destination.display().to_string(),
            self.store.path().display().to_string(),
        );

        info!(
            "Starting backup: {} -> {}{}",
            source.display(),
            destination.display(),
            if job.force_full { " (full requested)" } else { "" }
        );

        // A full run never compares against history, so it does not read it.
        *phase = Phase::DetermineMode;
        let mut mode = if job.force_full || !self.store.path().exists() {
            BackupType::Full
        } else {
            BackupType::Incremental
        };

        *phase = Phase::LoadPrevious;
        let previous = match mode {
            BackupType::Full => {
                if !job.force_full {
                    info!("No previous backup recorded, running a full backup");
                }
                None
            }
            BackupType::Incremental => match self.store.load() {
                LoadOutcome::Loaded(snapshot) => Some(snapshot),
                LoadOutcome::Missing => {
                    info!("No previous backup recorded, running a full backup");
                    None
                }
                LoadOutcome::Unusable(reason) => {
                    report
                        .warnings
                        .push(format!("previous metadata ignored, running a full backup: {}", reason));
                    None
                }
            },
        };
        if previous.is_none() {
            mode = BackupType::Full;
        }
        report.backup_type = mode;
        info!("Backup mode: {}", mode);

        let empty = BTreeMap::new();
        let previous_files = previous.as_ref().map(|s| &s.files).unwrap_or(&empty);
        report.files_in_previous_backup = previous_files.len();

        *phase = Phase::ScanSource;
        let current = self.scan(&source, &destination, &mut report)?;
        report.total_source_files = current.len();
        info!("Scanned {}: {} files", source.display(), current.len());

        if current.is_empty() {
            warn!("No files found in {}", source.display());
            report
                .warnings
                .push("no files found in source; stored metadata left unchanged".to_string());
            *phase = Phase::Done;
            return Ok(report);
        }

        *phase = Phase::Classify;
        let cancel = &self.cancel_token;
        let mut classification = classify(previous_files, &current, self.diff_options, |path: &Path| {
            if cancel.is_cancelled() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "backup cancelled"));
            }
            fingerprint(path)
        });
        self.check_cancelled()?;

        let to_copy = classification.to_copy();
        report.record_analysis(&classification);
        info!(
            "Analysis: {} new, {} modified, {} unreadable, {} unchanged, {} deleted, {} to copy",
            report.new_count,
            report.modified_count,
            report.unreadable_count,
            report.unchanged_count,
            report.deleted_count,
            to_copy.len()
        );

        *phase = Phase::Copy;
        let total_bytes: u64 = to_copy.iter().filter_map(|k| current.get(k)).map(|f| f.size).sum();
        let mut progress = CopyProgress::new(total_bytes, to_copy.len());
        let mut copied_records: BTreeMap<String, FileRecord> = BTreeMap::new();

        for key in &to_copy {
            self.check_cancelled()?;

            let Some(file) = current.get(key) else {
                continue;
            };

            if let Some(error) = classification.hash_errors.remove(key) {
                warn!("Cannot hash {}: {}", key, error);
                report.record_failure(key, FailureStage::Hash, error);
                progress.record_failed();
                continue;
            }

            let record = match classification.current_records.remove(key) {
                Some(record) => record,
                None => match fingerprint(&file.path) {
                    Ok(hash) => FileRecord::new(hash, file.size, file.mtime),
                    Err(e) => {
                        warn!("Cannot hash {}: {}", key, e);
                        report.record_failure(key, FailureStage::Hash, e);
                        progress.record_failed();
                        continue;
                    }
                },
            };

            let target = destination.join(&file.relative_path);
            match copy_file(&file.path, &target) {
                Ok(bytes) => {
                    progress.record_copied(bytes);
                    debug!(
                        "[{}/{}] Copied {} ({})",
                        progress.files_processed,
                        progress.total_files,
                        key,
                        format_bytes(bytes)
                    );
                    copied_records.insert(key.clone(), record);
                }
                Err(e) => {
                    warn!("Failed to copy {}: {}", key, e);
                    report.record_failure(key, FailureStage::Copy, e);
                    progress.record_failed();
                }
            }
        }

        report.copied_count = copied_records.len();
        report.copied_bytes = progress.copied_bytes;
        info!(
            "Copied {} of {} files, {} at {}",
            report.copied_count,
            to_copy.len(),
            format_bytes(progress.copied_bytes),
            format_speed(progress.average_speed())
        );

        *phase = Phase::BuildSnapshot;
        let snapshot = build_snapshot(
            mode,
            previous,
            copied_records,
            report.source.clone(),
            report.destination.clone(),
        );

        *phase = Phase::Persist;
        match self.store.save(&snapshot) {
            Ok(()) => report.snapshot_saved = true,
            Err(e) => {
                warn!("{}", e);
                report.warnings.push(format!(
                    "{}; files copied in this run will be copied again next time",
                    e
                ));
            }
        }

        *phase = Phase::Done;
        Ok(report)
    }

    /// Walk the source, keyed by canonical relative path.
    fn scan(
        &self,
        source: &Path,
        destination: &Path,
        report: &mut RunReport,
    ) -> Result<BTreeMap<String, ScannedFile>> {
        let mut options = self.walk_options.clone();
        options.skip_paths.extend(self.paths_inside(source, destination));

        let outcome = walk_directory(source, &options)?;

        for entry in outcome.skipped {
            warn!("Skipping {}: {}", entry.path.display(), entry.reason);
            report.skipped.push(FileFailure {
                path: entry.path.display().to_string(),
                stage: FailureStage::Scan,
                error: entry.reason,
            });
        }

        let mut current: BTreeMap<String, ScannedFile> = BTreeMap::new();
        for file in outcome.files {
            if let Some(existing) = current.get(&file.key) {
                warn!(
                    "{} and {} map to the same path {}",
                    existing.path.display(),
                    file.path.display(),
                    file.key
                );
                report.skipped.push(FileFailure {
                    path: file.path.display().to_string(),
                    stage: FailureStage::Scan,
                    error: format!("duplicate relative path {}", file.key),
                });
                continue;
            }
            current.insert(file.key.clone(), file);
        }

        Ok(current)
    }

    /// Paths under `source` that belong to the backup itself.
    fn paths_inside(&self, source: &Path, destination: &Path) -> Vec<PathBuf> {
        let metadata = absolute(self.store.path());
        let lock = crate::snapshot::StoreLock::lock_path(&metadata);

        [destination.to_path_buf(), metadata, lock]
            .into_iter()
            .filter(|p| p.starts_with(source) && p != source)
            .collect()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        Ok(())
    }
}

/// Merge the copy results into the snapshot that replaces the stored one.
///
/// Incremental: previous entries stay (including files deleted from the
/// source), copied files get fresh records. Full: only what was copied.
/// Files that failed keep whatever record they had, so the next run sees
/// them as changed again.
pub fn build_snapshot(
    mode: BackupType,
    previous: Option<Snapshot>,
    copied: BTreeMap<String, FileRecord>,
    source_root: String,
    destination_root: String,
) -> Snapshot {
    let files = match (mode, previous) {
        (BackupType::Incremental, Some(previous)) => {
            let mut files = previous.files;
            files.extend(copied);
            files
        }
        _ => copied,
    };

    Snapshot {
        last_backup_at: timestamp::now(),
        source_root,
        destination_root,
        backup_type: mode,
        files,
    }
}

/// Validate and canonicalize the job's roots, creating the destination.
fn resolve_roots(job: &BackupJob) -> Result<(PathBuf, PathBuf)> {
    let source = job.source.canonicalize().map_err(|e| {
        BackupError::Config(format!("source directory {} is not accessible: {}", job.source.display(), e))
    })?;
    if !source.is_dir() {
        return Err(BackupError::Config(format!(
            "source {} is not a directory",
            source.display()
        )));
    }

    std::fs::create_dir_all(&job.destination).map_err(|e| {
        BackupError::Config(format!(
            "destination directory {} cannot be created: {}",
            job.destination.display(),
            e
        ))
    })?;
    let destination = job.destination.canonicalize()?;

    if destination == source {
        return Err(BackupError::Config(
            "source and destination are the same directory".to_string(),
        ));
    }
    if source.starts_with(&destination) {
        return Err(BackupError::Config(format!(
            "source {} lies inside destination {}",
            source.display(),
            destination.display()
        )));
    }

    Ok((source, destination))
}

/// Absolute form of a path that may not exist yet.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::hasher::EMPTY_FINGERPRINT;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: PathBuf,
        root: PathBuf,
        metadata: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            let source = root.join("source");
            fs::create_dir(&source).unwrap();
            Self {
                metadata: root.join("home").join("backup_metadata.json"),
                source,
                root,
                _dir: dir,
            }
        }

        fn write(&self, key: &str, content: &str) {
            let path = self.source.join(key);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn executor(&self) -> BackupExecutor {
            BackupExecutor::new(SnapshotStore::new(&self.metadata))
        }

        fn run(&self, destination: &str, force_full: bool) -> Result<RunReport> {
            self.executor().execute(&BackupJob {
                source: self.source.clone(),
                destination: self.root.join(destination),
                force_full,
            })
        }

        fn snapshot(&self) -> Snapshot {
            SnapshotStore::new(&self.metadata)
                .load()
                .into_snapshot()
                .expect("snapshot saved")
        }

        fn tree(&self, destination: &str) -> BTreeMap<String, Vec<u8>> {
            let outcome = walk_directory(&self.root.join(destination), &WalkOptions::default()).unwrap();
            outcome
                .files
                .into_iter()
                .map(|f| (f.key, fs::read(f.path).unwrap()))
                .collect()
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn scenario_a(fixture: &Fixture) -> RunReport {
        fixture.write("a.txt", "1");
        fixture.write("b.txt", "2");
        fixture.run("dest_a", false).unwrap()
    }

    #[test]
    fn test_scenario_a_first_run_is_full() {
        let fixture = Fixture::new();
        let report = scenario_a(&fixture);

        assert_eq!(report.backup_type, BackupType::Full);
        assert_eq!(report.new_count, 2);
        assert_eq!(report.copied_count, 2);
        assert!(report.snapshot_saved);
        assert_eq!(set(&["a.txt", "b.txt"]), fixture.tree("dest_a").keys().cloned().collect());

        let snapshot = fixture.snapshot();
        assert_eq!(snapshot.backup_type, BackupType::Full);
        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(snapshot.files["a.txt"].content_hash, "c4ca4238a0b923820dcc509a6f75849b");
        assert_eq!(snapshot.source_root, fixture.source.canonicalize().unwrap().display().to_string());
    }

    #[test]
    fn test_scenario_b_incremental_to_new_destination() {
        let fixture = Fixture::new();
        scenario_a(&fixture);

        fixture.write("a.txt", "1-changed");
        fixture.write("c.txt", "3");
        let report = fixture.run("dest_b", false).unwrap();

        assert_eq!(report.backup_type, BackupType::Incremental);
        assert_eq!(report.files_in_previous_backup, 2);
        assert_eq!(report.new_paths, vec!["c.txt"]);
        assert_eq!(report.modified_paths, vec!["a.txt"]);
        assert_eq!(report.unchanged_count, 1);

        let tree = fixture.tree("dest_b");
        assert_eq!(set(&["a.txt", "c.txt"]), tree.keys().cloned().collect());
        assert_eq!(tree["a.txt"], b"1-changed");

        let snapshot = fixture.snapshot();
        assert_eq!(snapshot.backup_type, BackupType::Incremental);
        assert_eq!(snapshot.files.len(), 3);
        assert!(snapshot.destination_root.ends_with("dest_b"));
    }

    #[test]
    fn test_scenario_c_deleted_file_is_carried_forward() {
        let fixture = Fixture::new();
        scenario_a(&fixture);
        let before = fixture.snapshot();

        fs::remove_file(fixture.source.join("b.txt")).unwrap();
        let report = fixture.run("dest_a", false).unwrap();

        assert_eq!(report.deleted_paths, vec!["b.txt"]);
        assert_eq!(report.copied_count, 0);
        assert!(fixture.root.join("dest_a/b.txt").exists());

        let after = fixture.snapshot();
        assert_eq!(after.files["b.txt"], before.files["b.txt"]);
        assert_eq!(after.files.len(), 2);
    }

    #[test]
    fn test_scenario_d_empty_file() {
        let fixture = Fixture::new();
        fixture.write("empty.dat", "");

        let report = fixture.run("dest", false).unwrap();

        assert_eq!(report.copied_count, 1);
        assert!(report.failures.is_empty());
        let snapshot = fixture.snapshot();
        assert_eq!(snapshot.files["empty.dat"].content_hash, EMPTY_FINGERPRINT);
        assert_eq!(snapshot.files["empty.dat"].size_bytes, 0);
    }

    #[test]
    fn test_unchanged_source_copies_nothing() {
        let fixture = Fixture::new();
        scenario_a(&fixture);

        let report = fixture.run("dest_again", false).unwrap();

        assert_eq!(report.unchanged_count, 2);
        assert_eq!(report.to_copy_count(), 0);
        assert!(fixture.tree("dest_again").is_empty());
    }

    #[test]
    fn test_touched_file_is_unchanged() {
        let fixture = Fixture::new();
        scenario_a(&fixture);

        let later = filetime::FileTime::from_unix_time(2_000_000_000, 0);
        filetime::set_file_mtime(fixture.source.join("a.txt"), later).unwrap();
        let report = fixture.run("dest_touch", false).unwrap();

        assert!(report.modified_paths.is_empty());
        assert_eq!(report.unchanged_count, 2);
    }

    #[test]
    fn test_consecutive_full_runs_are_idempotent() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "1");
        fixture.write("nested/dir/b.txt", "2");

        fixture.run("dest_full", true).unwrap();
        let first_tree = fixture.tree("dest_full");
        let first = fixture.snapshot();

        let report = fixture.run("dest_full", true).unwrap();
        let second = fixture.snapshot();

        assert_eq!(report.backup_type, BackupType::Full);
        assert_eq!(report.files_in_previous_backup, 0);
        assert_eq!(fixture.tree("dest_full"), first_tree);
        assert_eq!(second.files, first.files);
        assert!(second.files.contains_key("nested/dir/b.txt"));
    }

    #[test]
    fn test_force_full_ignores_history() {
        let fixture = Fixture::new();
        scenario_a(&fixture);

        let report = fixture.run("dest_forced", true).unwrap();

        assert_eq!(report.backup_type, BackupType::Full);
        assert_eq!(report.new_count, 2);
        assert_eq!(fixture.tree("dest_forced").len(), 2);
    }

    #[test]
    fn test_corrupt_metadata_falls_back_to_full() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "1");
        fs::create_dir_all(fixture.metadata.parent().unwrap()).unwrap();
        fs::write(&fixture.metadata, "garbage").unwrap();

        let report = fixture.run("dest", false).unwrap();

        assert_eq!(report.backup_type, BackupType::Full);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(fixture.snapshot().files.len(), 1);
    }

    #[test]
    fn test_copy_failure_is_reported_and_not_recorded() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "1");
        fixture.write("b.txt", "2");
        // A directory where the file should go makes the rename fail.
        fs::create_dir_all(fixture.root.join("dest/a.txt/blocker")).unwrap();

        let report = fixture.run("dest", false).unwrap();

        assert_eq!(report.copied_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.failures[0].path, "a.txt");
        assert_eq!(report.failures[0].stage, FailureStage::Copy);
        assert!(report.snapshot_saved);

        let snapshot = fixture.snapshot();
        assert!(!snapshot.files.contains_key("a.txt"));
        assert!(snapshot.files.contains_key("b.txt"));
    }

    #[test]
    fn test_failed_copy_keeps_previous_record() {
        let fixture = Fixture::new();
        scenario_a(&fixture);
        let before = fixture.snapshot();

        fixture.write("a.txt", "changed");
        fs::create_dir_all(fixture.root.join("dest_blocked/a.txt/blocker")).unwrap();
        let report = fixture.run("dest_blocked", false).unwrap();

        assert_eq!(report.failed_count, 1);
        assert_eq!(fixture.snapshot().files["a.txt"], before.files["a.txt"]);

        // The next run still sees the change.
        let retry = fixture.run("dest_retry", false).unwrap();
        assert_eq!(retry.modified_paths, vec!["a.txt"]);
        assert_eq!(retry.copied_count, 1);
    }

    #[test]
    fn test_invalid_source_is_config_error() {
        let fixture = Fixture::new();
        let err = fixture
            .executor()
            .execute(&BackupJob {
                source: fixture.root.join("does-not-exist"),
                destination: fixture.root.join("dest"),
                force_full: false,
            })
            .unwrap_err();

        assert!(err.is_config());
        assert!(!fixture.metadata.exists());
    }

    #[test]
    fn test_same_source_and_destination_rejected() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "1");
        let err = fixture.run("source", false).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_source_leaves_metadata_alone() {
        let fixture = Fixture::new();
        let report = fixture.run("dest", false).unwrap();

        assert!(!report.snapshot_saved);
        assert_eq!(report.warnings.len(), 1);
        assert!(!fixture.metadata.exists());
    }

    #[test]
    fn test_destination_inside_source_is_not_scanned() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "1");

        fixture.run("source/backup", true).unwrap();
        let report = fixture.run("source/backup", true).unwrap();

        assert_eq!(report.total_source_files, 1);
        assert_eq!(fixture.snapshot().files.len(), 1);
    }

    #[test]
    fn test_cancelled_run_keeps_previous_snapshot() {
        let fixture = Fixture::new();
        scenario_a(&fixture);
        let before = fs::read_to_string(&fixture.metadata).unwrap();

        fixture.write("c.txt", "3");
        let token = CancellationToken::new();
        token.cancel();
        let err = fixture
            .executor()
            .with_cancel(token)
            .execute(&BackupJob {
                source: fixture.source.clone(),
                destination: fixture.root.join("dest_cancel"),
                force_full: false,
            })
            .unwrap_err();

        assert!(matches!(err, BackupError::Cancelled));
        assert_eq!(fs::read_to_string(&fixture.metadata).unwrap(), before);
        assert!(!fixture.root.join("dest_cancel/c.txt").exists());
    }

    #[test]
    fn test_quick_check_trusts_size_and_mtime() {
        let fixture = Fixture::new();
        scenario_a(&fixture);

        // Same size, same mtime, different bytes: only hashing notices.
        let path = fixture.source.join("a.txt");
        let mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        fs::write(&path, "9").unwrap();
        filetime::set_file_mtime(&path, mtime).unwrap();

        let quick = fixture
            .executor()
            .with_diff_options(DiffOptions { quick_check: true })
            .execute(&BackupJob {
                source: fixture.source.clone(),
                destination: fixture.root.join("dest_quick"),
                force_full: false,
            })
            .unwrap();
        assert!(quick.modified_paths.is_empty());

        let hashed = fixture.run("dest_hashed", false).unwrap();
        assert_eq!(hashed.modified_paths, vec!["a.txt"]);
    }

    #[test]
    fn test_build_snapshot_modes() {
        let record = |h: &str| FileRecord::new(h.to_string(), 1, 1.0);
        let previous = Snapshot {
            last_backup_at: timestamp::now(),
            source_root: "/s".into(),
            destination_root: "/d".into(),
            backup_type: BackupType::Full,
            files: [("old.txt".to_string(), record("a")), ("kept.txt".to_string(), record("b"))]
                .into_iter()
                .collect(),
        };
        let copied: BTreeMap<_, _> = [("old.txt".to_string(), record("c"))].into_iter().collect();

        let incremental = build_snapshot(
            BackupType::Incremental,
            Some(previous.clone()),
            copied.clone(),
            "/s".into(),
            "/d2".into(),
        );
        assert_eq!(incremental.files.len(), 2);
        assert_eq!(incremental.files["old.txt"].content_hash, "c");
        assert_eq!(incremental.destination_root, "/d2");

        let full = build_snapshot(BackupType::Full, Some(previous), copied, "/s".into(), "/d".into());
        assert_eq!(full.files.len(), 1);
        assert_eq!(full.backup_type, BackupType::Full);
    }

    #[test]
    fn test_staging_lookalike_in_source_is_backed_up() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "A");
        fixture.write(".a.txt.partial", "P");

        let report = fixture.run("dest", true).unwrap();

        assert_eq!(report.copied_count, 2);
        assert!(report.failures.is_empty());
        let tree = fixture.tree("dest");
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[".a.txt.partial"], b"P");
        assert_eq!(tree["a.txt"], b"A");
        assert_eq!(fixture.snapshot().files.len(), 2);
    }

    #[test]
    fn test_unusable_metadata_location_fails_without_lock() {
        let fixture = Fixture::new();
        fixture.write("a.txt", "1");
        fs::write(fixture.root.join("not-a-dir"), "x").unwrap();

        let err = BackupExecutor::new(SnapshotStore::new(fixture.root.join("not-a-dir/meta.json")))
            .with_lock(false)
            .execute(&BackupJob {
                source: fixture.source.clone(),
                destination: fixture.root.join("dest"),
                force_full: false,
            })
            .unwrap_err();

        assert!(err.is_config());
        assert!(fixture.tree("dest").is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_read_only_metadata_dir_fails_without_lock() {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new();
        fixture.write("a.txt", "1");
        let home = fixture.metadata.parent().unwrap().to_path_buf();
        fs::create_dir_all(&home).unwrap();
        fs::set_permissions(&home, fs::Permissions::from_mode(0o555)).unwrap();

        let writable = fs::File::create(home.join("check")).is_ok();
        let result = fixture.executor().with_lock(false).execute(&BackupJob {
            source: fixture.source.clone(),
            destination: fixture.root.join("dest"),
            force_full: false,
        });
        fs::set_permissions(&home, fs::Permissions::from_mode(0o755)).unwrap();
        if writable {
            return;
        }

        assert!(result.unwrap_err().is_config());
        assert!(fixture.tree("dest").is_empty());
    }

    #[test]
    fn test_failing_phase_is_tracked() {
        let fixture = Fixture::new();
        scenario_a(&fixture);
        let job = BackupJob {
            source: fixture.source.clone(),
            destination: fixture.root.join("dest_phase"),
            force_full: false,
        };

        let mut phase = Phase::Start;
        fixture.executor().run(&job, &mut phase).unwrap();
        assert_eq!(phase, Phase::Done);

        let token = CancellationToken::new();
        token.cancel();
        let mut phase = Phase::Start;
        assert!(fixture.executor().with_cancel(token).run(&job, &mut phase).is_err());
        assert_eq!(phase, Phase::Classify);

        let missing = BackupJob {
            source: fixture.root.join("missing"),
            ..job
        };
        let mut phase = Phase::Start;
        assert!(fixture.executor().run(&missing, &mut phase).is_err());
        assert_eq!(phase, Phase::Start);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::ScanSource.to_string(), "scan-source");
        assert_eq!(Phase::Persist.to_string(), "persist");
    }

    #[test]
    fn test_from_config_uses_metadata_path() {
        let mut config = Config::default();
        config.store.metadata_path = Some(PathBuf::from("/tmp/custom-meta.json"));
        config.compare.quick_check = true;

        let executor = BackupExecutor::from_config(&config).unwrap();
        assert_eq!(executor.store().path(), Path::new("/tmp/custom-meta.json"));
        assert!(executor.diff_options.quick_check);
    }
}
