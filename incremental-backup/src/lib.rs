//! Incremental Backup Library
//!
//! Content-hash based incremental backups: only new or changed files are
//! copied, and a JSON snapshot of the last run decides what changed.

pub mod config;
pub mod executor;
pub mod fs;
pub mod snapshot;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::report::RunReport;
pub use executor::{BackupExecutor, BackupJob};
pub use utils::errors::BackupError;
pub use utils::Result;
