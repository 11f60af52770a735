//! Progress accounting for the copy phase.
//!
//! Tracks files and bytes copied against the planned totals, plus
//! formatting helpers shared with the console report.

use std::time::{Duration, Instant};

/// Progress of the copy phase
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// Total bytes planned for copy
    pub total_bytes: u64,

    /// Total number of files planned for copy
    pub total_files: usize,

    /// Bytes copied so far
    pub copied_bytes: u64,

    /// Files attempted so far (copied or failed)
    pub files_processed: usize,

    start_time: Instant,
}

impl CopyProgress {
    pub fn new(total_bytes: u64, total_files: usize) -> Self {
        Self {
            total_bytes,
            total_files,
            copied_bytes: 0,
            files_processed: 0,
            start_time: Instant::now(),
        }
    }

    /// Record a successfully copied file
    pub fn record_copied(&mut self, bytes: u64) {
        self.copied_bytes += bytes;
        self.files_processed += 1;
    }

    /// Record a file that could not be copied
    pub fn record_failed(&mut self) {
        self.files_processed += 1;
    }

    /// Percentage of planned bytes copied (0-100)
    pub fn percent_complete(&self) -> f64 {
        if self.total_bytes > 0 {
            ((self.copied_bytes as f64 / self.total_bytes as f64) * 100.0).min(100.0)
        } else if self.files_processed >= self.total_files {
            100.0
        } else {
            0.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start in bytes/second
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.copied_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
