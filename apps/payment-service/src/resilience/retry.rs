//! Retry with exponential backoff and jitter.
//!
//! A [`RetryPolicy`] re-runs a unit of work until it succeeds, hits a
//! non-retryable error, or runs out of attempts.
//!
//! # Backoff
//!
//! The delay before retry `i` (zero-based, so the first retry uses `i = 0`) is
//!
//! ```text
//! delay = min(base_delay * exponential_base^i, max_delay)
//! ```
//!
//! With jitter enabled the delay is scaled by a uniform factor in `[0.5, 1.0)`
//! so concurrent callers retrying the same dependency drift apart.
//!
//! # Retryable Errors
//!
//! | Retried | Not retried |
//! |---------|-------------|
//! | Kinds matched by `retry_on` | Kinds outside `retry_on` |
//! | Timeouts from the timeout guard | `CircuitOpen` (always) |
//!
//! The policy holds no state between calls and is shared freely across tasks.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::duration_secs;
use super::error::{Classify, ErrorKind, FailurePolicy, ResilienceError};
use crate::infrastructure::metrics;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1s).
    pub base_delay: Duration,
    /// Upper bound on any single delay (default: 60s).
    pub max_delay: Duration,
    /// Growth factor per retry (default: 2.0).
    pub exponential_base: f64,
    /// Scale delays by a random factor in [0.5, 1.0) (default: true).
    pub jitter: bool,
    /// Which error kinds are retried (default: all).
    pub retry_on: FailurePolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            retry_on: FailurePolicy::Any,
        }
    }
}

impl RetryConfig {
    /// Create a jittered configuration that retries every error kind.
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            exponential_base,
            jitter: true,
            retry_on: FailurePolicy::Any,
        }
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Restrict which error kinds are retried.
    #[must_use]
    pub fn with_retry_on(mut self, retry_on: FailurePolicy) -> Self {
        self.retry_on = retry_on;
        self
    }
}

/// Retry policy for one named operation.
#[derive(Debug)]
pub struct RetryPolicy {
    name: String,
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Get the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry `attempt_index`, without jitter.
    #[must_use]
    pub fn base_delay_for(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let max_secs = self.config.max_delay.as_secs_f64();
        let secs = (self.config.base_delay.as_secs_f64()
            * self.config.exponential_base.powi(exponent))
        .min(max_secs)
        .max(0.0);

        Duration::try_from_secs_f64(secs).unwrap_or(self.config.max_delay)
    }

    /// Delay before retry `attempt_index`, with jitter applied when enabled.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let delay = self.base_delay_for(attempt_index);
        if !self.config.jitter {
            return delay;
        }

        let factor = rand::rng().random_range(0.5..1.0);
        delay.mul_f64(factor)
    }

    /// Run `operation` until it succeeds or the retry budget is spent.
    ///
    /// The last attempt's error is returned. Non-retryable errors return
    /// immediately without sleeping.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt made.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        E: Classify + std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            name = %self.name,
                            attempts = attempt + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.kind();
            if !self.is_retryable(kind) {
                tracing::debug!(name = %self.name, kind = %kind, "Error is not retryable");
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                tracing::error!(
                    name = %self.name,
                    attempts = max_attempts,
                    error = %error,
                    "Retry attempts exhausted"
                );
                metrics::record_retry_exhausted(&self.name);
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                name = %self.name,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Attempt failed, retrying"
            );
            metrics::record_retry_attempt(&self.name);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Get a metrics snapshot for this policy.
    #[must_use]
    pub fn metrics(&self) -> RetryPolicyMetrics {
        RetryPolicyMetrics {
            name: self.name.clone(),
            max_attempts: self.config.max_attempts,
            base_delay: self.config.base_delay,
            max_delay: self.config.max_delay,
            exponential_base: self.config.exponential_base,
            jitter: self.config.jitter,
        }
    }

    fn is_retryable(&self, kind: ErrorKind) -> bool {
        kind != ErrorKind::CircuitOpen && self.config.retry_on.matches(kind)
    }
}

/// Metrics snapshot for a retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyMetrics {
    /// Operation name.
    pub name: String,
    /// Total attempts allowed.
    pub max_attempts: u32,
    /// Base delay, in seconds.
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    /// Maximum delay, in seconds.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Growth factor per retry.
    pub exponential_base: f64,
    /// Whether jitter is applied.
    pub jitter: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::resilience::error::{CircuitOpenError, TimeoutError};

    #[derive(Debug, PartialEq, Eq, thiserror::Error)]
    enum DepError {
        #[error("unavailable (attempt {0})")]
        Unavailable(u32),
        #[error("invalid card")]
        InvalidCard,
    }

    impl Classify for DepError {
        fn kind(&self) -> ErrorKind {
            match self {
                Self::Unavailable(_) => ErrorKind::Unavailable,
                Self::InvalidCard => ErrorKind::Rejected,
            }
        }
    }

    fn policy(max_attempts: u32, base_ms: u64, jitter: bool) -> RetryPolicy {
        RetryPolicy::new(
            "test",
            RetryConfig::new(
                max_attempts,
                Duration::from_millis(base_ms),
                Duration::from_secs(30),
                2.0,
            )
            .with_jitter(jitter),
        )
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.exponential_base - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter);
    }

    #[test]
    fn test_base_delay_grows_exponentially() {
        let policy = policy(5, 500, false);
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = policy(5, 1000, false);
        assert_eq!(policy.base_delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.base_delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_range() {
        let policy = policy(3, 1000, true);
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_secs(1), "delay too short: {delay:?}");
            assert!(delay < Duration::from_secs(2), "delay too long: {delay:?}");
        }
    }

    #[tokio::test]
    async fn test_first_success_makes_one_attempt() {
        let policy = policy(3, 10, false);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ResilienceError<DepError>>("ok")
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let policy = policy(3, 100, true);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ResilienceError::Operation(DepError::Unavailable(n)))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_after_backoff() {
        let policy = policy(3, 1000, false);
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(ResilienceError::Operation(DepError::Unavailable(n)))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(matches!(
            result,
            Err(ResilienceError::Operation(DepError::Unavailable(3)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::new(
            "classified",
            RetryConfig::default().with_retry_on(FailurePolicy::transient()),
        );
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::Operation(DepError::InvalidCard))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(
            result,
            Err(ResilienceError::Operation(DepError::InvalidCard))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_open_is_never_retried() {
        let policy = policy(5, 100, false);
        let calls = AtomicU32::new(0);

        let result: Result<(), ResilienceError<DepError>> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CircuitOpenError {
                    name: "db".to_string(),
                }
                .into())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried() {
        let policy = policy(2, 100, false);
        let calls = AtomicU32::new(0);

        let result: Result<(), ResilienceError<DepError>> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TimeoutError {
                    operation: "publish".to_string(),
                    after: Duration::from_secs(10),
                }
                .into())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = policy(0, 10, false);
        let calls = AtomicU32::new(0);

        let _: Result<(), _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::Operation(DepError::Unavailable(1)))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metrics_snapshot_serializes_seconds() {
        let policy = policy(2, 2000, true);
        let json = serde_json::to_value(policy.metrics()).unwrap();
        assert_eq!(json["max_attempts"], 2);
        assert_eq!(json["base_delay"], 2.0);
        assert_eq!(json["max_delay"], 30.0);
    }

    proptest! {
        #[test]
        fn test_delay_within_bounds(
            attempt in 0u32..16,
            base_ms in 1u64..5_000,
            max_ms in 1u64..60_000,
            exponential_base in 1.0f64..3.0,
        ) {
            let config = RetryConfig::new(
                3,
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
                exponential_base,
            );
            let policy = RetryPolicy::new("prop", config);

            let computed = policy.base_delay_for(attempt);
            prop_assert!(computed <= Duration::from_millis(max_ms));

            let jittered = policy.delay_for(attempt);
            prop_assert!(jittered <= computed);
            prop_assert!(jittered >= computed.mul_f64(0.5).saturating_sub(Duration::from_nanos(1)));
        }
    }
}
