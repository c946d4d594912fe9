//! Graceful shutdown on SIGTERM or SIGINT.
//!
//! The HTTP server stops accepting requests once shutdown is signalled;
//! running uploads are cancelled by the caller afterwards.

use tokio::signal;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once shutdown has been triggered. Suitable for
    /// `axum::serve(..).with_graceful_shutdown`.
    pub fn signalled(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Block until the process receives SIGINT or SIGTERM, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> ShutdownSignal {
        let interrupt = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let received = tokio::select! {
            _ = interrupt => ShutdownSignal::Interrupt,
            _ = terminate => ShutdownSignal::Terminate,
        };
        info!("Received {:?}, shutting down", received);

        self.trigger();
        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signalled_resolves_on_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = tokio::spawn(coordinator.signalled());

        assert!(!coordinator.is_triggered());
        coordinator.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(coordinator.is_triggered());
    }

    #[tokio::test]
    async fn test_signalled_after_trigger_is_ready() {
        let coordinator = ShutdownCoordinator::new();
        let clone = coordinator.clone();
        clone.trigger();

        tokio::time::timeout(Duration::from_secs(1), coordinator.signalled())
            .await
            .unwrap();
    }
}
