//! Signal-driven graceful shutdown.
//!
//! Listens for SIGINT/SIGTERM and trips a [`CancellationToken`] that the
//! server loop and the maintenance task both watch.

use tokio_util::sync::CancellationToken;

pub struct SigDown {
    token: CancellationToken,
}

impl SigDown {
    pub fn try_new() -> std::io::Result<Self> {
        let token = CancellationToken::new();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = signal(SignalKind::terminate())?;
            let trip = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT, shutting down");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, shutting down");
                    }
                }
                trip.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            let trip = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received Ctrl-C, shutting down");
                }
                trip.cancel();
            });
        }

        Ok(Self { token })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
