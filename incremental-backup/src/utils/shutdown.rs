//! Interrupt handling for SIGTERM and SIGINT.
//!
//! A signal cancels the run's token. The executor checks the token between
//! files and stops before the snapshot is written, so the metadata file from
//! the previous run stays in place.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token handed to the backup run
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGTERM or SIGINT, then cancel the token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), stopping after the current file...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping after the current file...");
            }
        }

        self.token.cancel();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
