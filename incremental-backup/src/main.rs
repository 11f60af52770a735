//! Incremental Backup - command line entry point
//!
//! Usage: backup <SOURCE> <DESTINATION> [--full]

use anyhow::{Context, Result};
use clap::Parser;
use incremental_backup::{
    config::Config, utils, utils::shutdown::ShutdownCoordinator, BackupExecutor, BackupJob,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "backup", author, version, about, long_about = None)]
struct Args {
    /// Directory to back up
    source: PathBuf,

    /// Directory receiving the copied files (created if missing)
    destination: PathBuf,

    /// Copy every file and ignore the previous backup
    #[arg(long)]
    full: bool,

    /// Metadata file (overrides config and BACKUP_METADATA_PATH)
    #[arg(short, long, value_name = "FILE")]
    metadata: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Treat files with unchanged size and mtime as unchanged without hashing
    #[arg(long)]
    quick_check: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(metadata) = args.metadata {
        config.store.metadata_path = Some(metadata);
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    if args.quick_check {
        config.compare.quick_check = true;
    }

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    tracing::info!("Starting backup v{}", env!("CARGO_PKG_VERSION"));

    // Create shutdown coordinator
    let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
    let executor = BackupExecutor::from_config(&config)?.with_cancel(shutdown_coordinator.token());

    let signals = Arc::clone(&shutdown_coordinator);
    let signal_handle = tokio::spawn(async move {
        signals.wait_for_signal().await;
    });

    let job = BackupJob {
        source: args.source,
        destination: args.destination,
        force_full: args.full,
    };

    // Hashing and copying block, so the run goes to the blocking pool
    let outcome = tokio::task::spawn_blocking(move || executor.execute(&job))
        .await
        .context("backup task panicked")?;
    signal_handle.abort();

    let report = outcome?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(())
}
