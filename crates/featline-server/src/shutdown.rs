//! Graceful shutdown
//!
//! One root `CancellationToken` is the parent of every retrieval call's
//! token. A termination signal cancels it, which:
//! - stops axum from accepting new connections
//! - aborts store reads still in flight (their calls fail with `Cancelled`)
//! - stops the registry refresh task
//!
//! ## Usage
//!
//! ```rust,ignore
//! let shutdown = CancellationToken::new();
//! tokio::spawn(cancel_on_signal(shutdown.clone()));
//!
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(shutdown.cancelled_owned())
//!     .await?;
//! ```

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Waits for SIGTERM (Docker/Kubernetes) or SIGINT (Ctrl+C)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Cancels `token` on the first termination signal
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = shutdown_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
}

/// Waits for `server` to drain, giving up after `grace_period`
pub async fn drain<F>(server: F, grace_period: Duration)
where
    F: std::future::Future<Output = ()>,
{
    if tokio::time::timeout(grace_period, server).await.is_err() {
        warn!(
            "In-flight requests did not complete within grace period ({:?})",
            grace_period
        );
    }
}
