//! Composed resilience for one named dependency call.
//!
//! # Layering
//!
//! ```text
//! RateLimiter (optional)
//!   └─ Bulkhead (optional)
//!        └─ CircuitBreaker
//!             └─ RetryPolicy
//!                  └─ TimeoutGuard (optional, per attempt)
//!                       └─ unit of work
//! ```
//!
//! Retry sits inside the breaker, so the breaker records one outcome per
//! overall call after retries are exhausted rather than one per attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::bulkhead::Bulkhead;
use super::circuit_breaker::CircuitBreaker;
use super::error::{Classify, ResilienceError};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::timeout::TimeoutGuard;

/// A dependency call wrapped in circuit breaker, retry and timeout layers.
///
/// Built by [`ResilienceManager`](super::ResilienceManager); the breaker and
/// retry policy are the registry's shared instances for the operation name.
#[derive(Debug, Clone)]
pub struct ResilientOperation {
    name: String,
    circuit_breaker: Arc<CircuitBreaker>,
    retry_policy: Arc<RetryPolicy>,
    timeout: Option<TimeoutGuard>,
    bulkhead: Option<Arc<Bulkhead>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl ResilientOperation {
    pub(crate) fn new(
        name: String,
        circuit_breaker: Arc<CircuitBreaker>,
        retry_policy: Arc<RetryPolicy>,
        timeout: Option<Duration>,
    ) -> Self {
        let timeout = timeout.map(|after| TimeoutGuard::new(name.clone(), after));
        Self {
            name,
            circuit_breaker,
            retry_policy,
            timeout,
            bulkhead: None,
            rate_limiter: None,
        }
    }

    /// Bound every attempt to `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(TimeoutGuard::new(self.name.clone(), timeout));
        self
    }

    /// Reject calls when `bulkhead` has no free permit.
    #[must_use]
    pub fn with_bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Space calls through `rate_limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Registry name of this operation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared circuit breaker.
    #[must_use]
    pub const fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// The shared retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &Arc<RetryPolicy> {
        &self.retry_policy
    }

    /// Run `operation` through every configured layer.
    ///
    /// `operation` is called once per attempt and must build a fresh future
    /// each time. With a timeout configured each attempt is spawned on its
    /// own task; otherwise it runs inline.
    ///
    /// # Errors
    ///
    /// Returns a resilience rejection (`CircuitOpen`, `BulkheadFull`,
    /// `Timeout`, `TaskFailed`) or the final attempt's dependency error.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + std::fmt::Display + Send + 'static,
    {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.acquire().await;
        }
        let _permit = match &self.bulkhead {
            Some(bulkhead) => Some(bulkhead.try_enter()?),
            None => None,
        };

        let timeout = self.timeout.as_ref();
        let attempt = move || {
            let unit = operation();
            async move {
                match timeout {
                    Some(guard) => guard.run(unit).await,
                    None => unit.await.map_err(ResilienceError::Operation),
                }
            }
        };

        self.circuit_breaker
            .call(|| self.retry_policy.execute(attempt))
            .await
    }
}
