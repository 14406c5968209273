//! Process shutdown signal handling for the gpupulse daemons

use tracing::info;

/// Resolve when the process receives SIGINT or SIGTERM.
///
/// Every daemon loop observes this through `serve_with_shutdown` or a
/// `tokio::select!` arm, giving one root cancellation for the process.
pub async fn shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}
