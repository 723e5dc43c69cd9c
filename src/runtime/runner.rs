use crate::runtime::service::Service;
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Runs a [`Service`] and handles OS signals for graceful shutdowns.
pub struct Runner {
    service: Service,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(service: Service) -> Self {
        Self::with_cancellation_token(service, CancellationToken::new())
    }

    pub fn with_cancellation_token(service: Service, shutdown: CancellationToken) -> Self {
        Self { service, shutdown }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is cancelled
    /// elsewhere, or the monitor fails.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let run = self.service.monitor_game(&self.shutdown);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            signal = signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::info!("Ctrl-C received; shutting down runner");
                    self.shutdown.cancel();
                }
                Err(err) => {
                    tracing::warn!(error = %err, "unable to listen for Ctrl-C; running until cancelled");
                }
            },
        }

        run.await
    }
}
