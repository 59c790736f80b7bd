//! Per-stage retry for transient failures.

use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ErrorKind, PipelineError, Stage};

/// How many times a stage is re-run after a transient failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Run `op`, re-running it on transient failures until it succeeds,
    /// retries are exhausted, or `cancel` fires.
    pub async fn run<T, F, Fut>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut backoff = self.backoff();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::new(
                    stage,
                    ErrorKind::Cancelled,
                    "cancelled before stage",
                ));
            }
            attempts += 1;
            debug!(%stage, attempt = attempts, "Running stage");

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.kind.is_transient() || attempts > self.max_retries {
                return Err(err);
            }

            let Some(delay) = backoff.next_backoff() else {
                return Err(err);
            };

            warn!(
                %stage,
                kind = %err.kind,
                error = %err.detail,
                retry_in_ms = delay.as_millis() as u64,
                "Stage failed, retrying"
            );

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(PipelineError::new(stage, ErrorKind::Cancelled, "cancelled during retry backoff"));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
