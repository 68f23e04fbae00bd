use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Process-wide shutdown signal for the REPL.
/// Cancels its token on SIGTERM (or Ctrl+C off unix) so the session can
/// end cleanly and persist.
#[derive(Debug, Clone, Default)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Spawn a task that waits for an OS termination signal.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = sigterm.recv() => tracing::info!("received SIGTERM, ending session"),
                            _ = token.cancelled() => return,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to register SIGTERM handler");
                        return;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, ending session"),
                    _ = token.cancelled() => return,
                }
            }
            token.cancel();
        });
    }
}
