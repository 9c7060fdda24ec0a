//! Graceful shutdown on Ctrl+C or SIGTERM.

use tokio::signal;
use tracing::{info, warn};

use crate::logging::prefix::PULSE_CLOSE;

/// Resolves when a shutdown signal is received.
///
/// If a handler cannot be installed that signal is simply never observed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("{} Received Ctrl+C, shutting down", PULSE_CLOSE);
        }
        _ = terminate => {
            info!("{} Received terminate signal, shutting down", PULSE_CLOSE);
        }
    }
}
