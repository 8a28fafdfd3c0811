use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Reports node liveness and returns the TTL before the next report is due.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn heartbeat(&self) -> Result<Duration>;
}

/// Periodic liveness reporting governed by the server-supplied TTL.
///
/// After a successful report the loop waits the TTL the server returned.
/// After a failure it waits the fixed retry delay instead, so failures are
/// retried sooner than the nominal interval. There is no bound on
/// consecutive failures; eviction is the server's decision.
pub struct HeartbeatLoop {
    initial_ttl: Duration,
    retry: Duration,
}

impl HeartbeatLoop {
    pub fn new(initial_ttl: Duration, retry: Duration) -> Self {
        Self { initial_ttl, retry }
    }

    /// Run until `cancel` fires.
    pub async fn run<R: StatusReporter + ?Sized>(&self, reporter: &R, cancel: CancellationToken) {
        let mut next = self.initial_ttl;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(next) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = reporter.heartbeat() => result,
            };

            next = match result {
                Ok(ttl) if ttl.is_zero() => {
                    tracing::warn!("Server returned a zero heartbeat TTL, using retry delay");
                    self.retry
                }
                Ok(ttl) => {
                    tracing::debug!(next_ms = ttl.as_millis() as u64, "Heartbeat sent");
                    ttl
                }
                Err(e) => {
                    tracing::error!(error = %e, retry_ms = self.retry.as_millis() as u64, "Heartbeat failed, retrying");
                    self.retry
                }
            };
        }

        tracing::debug!("Heartbeat loop exited");
    }
}
