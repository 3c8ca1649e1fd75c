//! Bounded retry with exponential backoff for control-plane calls.
//!
//! Every call is wrapped in the operation timeout; a timeout counts as
//! a transient failure. Transient failures are retried up to
//! `max_attempts` total attempts, doubling the backoff each time up to
//! `max_backoff`. Permanent and already-absent errors return at once.
//! A cancelled run stops between attempts with `ControlPlaneError::Cancelled`.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use fleet_core::ExecutionSettings;

use crate::cancel::CancelSignal;
use crate::error::{ControlPlaneError, ControlPlaneResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on a single attempt.
    pub operation_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ExecutionSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff,
            max_backoff: settings.max_backoff,
            operation_timeout: settings.operation_timeout,
        }
    }

    /// Run `call` until it succeeds, fails permanently, attempts run out,
    /// or `cancel` fires. The first attempt is never skipped here; callers
    /// check cancellation before dispatching it.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        resource: &str,
        cancel: &mut CancelSignal,
        mut call: F,
    ) -> ControlPlaneResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ControlPlaneResult<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.operation_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ControlPlaneError::Transient(format!(
                    "timed out after {}s",
                    self.operation_timeout.as_secs_f64()
                ))),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, resource, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(ControlPlaneError::Transient(msg)) if attempt < self.max_attempts => {
                    warn!(
                        operation,
                        resource,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %msg,
                        "transient failure, retrying"
                    );
                    let cancelled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(backoff) => cancel.is_cancelled(),
                    };
                    if cancelled {
                        debug!(operation, resource, attempt, error = %msg, "run cancelled, not retrying");
                        return Err(ControlPlaneError::Cancelled);
                    }
                    backoff = (backoff * 2).min(self.max_backoff);
                    attempt += 1;
                }
                Err(ControlPlaneError::Transient(msg)) => {
                    return Err(ControlPlaneError::Transient(format!(
                        "{msg} (gave up after {attempt} attempts)"
                    )));
                }
                Err(other) => return Err(other),
            }
        }
    }
}
