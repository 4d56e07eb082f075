//! Provides a shutdown signal to gracefully stop the polling loop.
//!
//! See: [`signal`]

use tokio::signal;
use tracing::{error, info};

/// Resolves once the process is asked to stop, either by Ctrl + C or, on Unix, by `SIGTERM`.
///
/// If a signal handler cannot be installed the error is logged and the corresponding branch never resolves.
pub async fn signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl + C signal handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl + C, shutting down…"),
        _ = terminate => info!("received SIGTERM, shutting down…"),
    }
}
