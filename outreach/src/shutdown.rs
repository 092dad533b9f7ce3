//! Cooperative shutdown shared by the send workers and the tracking server.
//!
//! Workers poll the flag before claiming a task and before each delivery
//! attempt, and race it against their sleeps. A send already in flight is
//! never interrupted. The tracker hands `triggered()` to axum as its
//! graceful shutdown future.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every worker to stop. Repeated calls have no further effect.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            warn!("shutdown_requested");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

/// Trigger `shutdown` on SIGINT or SIGTERM.
pub async fn listen_for_signals(shutdown: Shutdown) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_unavailable");
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
                warn!(error = %e, "sigterm_handler_unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
        _ = shutdown.triggered() => return,
    }

    shutdown.trigger();
}
