//! Wall-clock bound on a single attempt.
//!
//! The attempt runs on its own tokio task and the caller waits on the task
//! handle for at most the configured duration. When the bound is exceeded the
//! caller gets a [`TimeoutError`] and the handle is dropped.
//!
//! Dropping a `JoinHandle` detaches the task; it does not abort it. A timed-out
//! attempt may keep running and holding its resources until it finishes on its
//! own. Integrators whose units of work must not outlive the caller need their
//! own cancellation inside the unit of work.

use std::future::Future;
use std::time::Duration;

use super::error::{ResilienceError, TaskFailedError, TimeoutError};
use crate::infrastructure::metrics;

/// Bounds how long a caller waits for one attempt.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    name: String,
    timeout: Duration,
}

impl TimeoutGuard {
    /// Create a guard for the named operation.
    #[must_use]
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
        }
    }

    /// Get the configured bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawn `attempt` and wait for it up to the configured bound.
    ///
    /// # Errors
    ///
    /// - [`ResilienceError::Timeout`] when the bound is exceeded
    /// - [`ResilienceError::TaskFailed`] when the attempt panics
    /// - [`ResilienceError::Operation`] with the attempt's own error
    pub async fn run<T, E, Fut>(&self, attempt: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let handle = tokio::spawn(attempt);

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result.map_err(ResilienceError::Operation),
            Ok(Err(join_error)) => {
                let reason = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "task cancelled".to_string()
                };
                tracing::error!(name = %self.name, reason = %reason, "Attempt task failed");
                Err(TaskFailedError {
                    operation: self.name.clone(),
                    reason,
                }
                .into())
            }
            Err(_elapsed) => {
                tracing::warn!(
                    name = %self.name,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Attempt timed out"
                );
                metrics::record_timeout(&self.name);
                Err(TimeoutError {
                    operation: self.name.clone(),
                    after: self.timeout,
                }
                .into())
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}
