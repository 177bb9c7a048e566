//! Resilience Layer
//!
//! Circuit breakers, retry with backoff, per-attempt timeouts and the optional
//! bulkhead and rate limiter, composed per dependency call.
//!
//! # Components
//!
//! - [`CircuitBreaker`]: fail-fast state machine per operation name
//! - [`RetryPolicy`]: bounded retries with exponential backoff and jitter
//! - [`TimeoutGuard`]: bounds how long the caller waits for one attempt
//! - [`Bulkhead`], [`RateLimiter`]: optional admission layers
//! - [`ResilienceManager`]: registry handing out shared instances and
//!   [`ResilientOperation`] wrappers per [`ResilienceProfile`]
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = Arc::new(ResilienceManager::new());
//!
//! let receipt = manager
//!     .payment_gateway("simulated_gateway")
//!     .with_timeout(Duration::from_secs(30))
//!     .execute(move || {
//!         let gateway = Arc::clone(&gateway);
//!         let request = request.clone();
//!         async move { gateway.charge(&request).await }
//!     })
//!     .await?;
//! ```

mod bulkhead;
mod circuit_breaker;
mod error;
mod manager;
mod operation;
mod profile;
mod rate_limiter;
mod retry;
mod timeout;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState,
};
pub use error::{
    BulkheadFullError, CircuitOpenError, Classify, ErrorKind, FailurePolicy, RateLimitedError,
    ResilienceError, TaskFailedError, TimeoutError,
};
pub use manager::{ResilienceManager, ResilienceMetrics};
pub use operation::ResilientOperation;
pub use profile::{ProfileSettings, ResilienceProfile};
pub use rate_limiter::{InvalidRateError, RateLimiter};
pub use retry::{RetryConfig, RetryPolicy, RetryPolicyMetrics};
pub use timeout::TimeoutGuard;

/// Serde helpers writing a `Duration` as fractional seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
