//! Graceful shutdown handling for vigild.

use crate::context::Collectors;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Broadcast a shutdown signal on SIGINT or SIGTERM.
///
/// Loops subscribe to the returned sender before the signal can fire.
pub fn shutdown_signal() -> broadcast::Sender<()> {
    let (tx, _) = broadcast::channel(1);
    let notify = tx.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                info!("Received SIGTERM");
            }
        }

        let _ = notify.send(());
    });

    tx
}

/// Wait for the loops to stop, then stop every background poller.
pub async fn shutdown(ctx: &Collectors, tasks: Vec<JoinHandle<()>>) {
    info!("Starting graceful shutdown...");

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background loop ended abnormally");
        }
    }

    let tracked = ctx.migrations.tracked().await;
    ctx.migrations.stop_all().await;
    info!(migrations = tracked, "Migration pollers stopped");

    info!("Graceful shutdown complete");
}
