//! Minimum spacing between calls.
//!
//! Callers are serialized: each one waits until `1 / calls_per_second` has
//! passed since the previous call was let through. [`RateLimiter::try_call`]
//! refuses instead of waiting.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::error::{RateLimitedError, ResilienceError};

/// Invalid rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("calls_per_second must be positive and finite, got {0}")]
pub struct InvalidRateError(pub f64);

/// Spacing-based rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `calls_per_second` calls per second.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRateError`] when the rate is zero, negative or not finite.
    pub fn new(name: impl Into<String>, calls_per_second: f64) -> Result<Self, InvalidRateError> {
        if !calls_per_second.is_finite() || calls_per_second <= 0.0 {
            return Err(InvalidRateError(calls_per_second));
        }
        let min_interval = Duration::try_from_secs_f64(1.0 / calls_per_second)
            .map_err(|_| InvalidRateError(calls_per_second))?;

        Ok(Self {
            name: name.into(),
            min_interval,
            last_call: Mutex::new(None),
        })
    }

    /// Get the limiter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum spacing between admitted calls.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(
                    name = %self.name,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "Rate limiting call"
                );
                tokio::time::sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    /// Take a slot only if one is free right now.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitedError`] when called before the spacing has elapsed.
    pub async fn try_acquire(&self) -> Result<(), RateLimitedError> {
        let mut last_call = self.last_call.lock().await;
        if last_call.is_some_and(|last| last.elapsed() < self.min_interval) {
            return Err(RateLimitedError {
                name: self.name.clone(),
            });
        }
        *last_call = Some(Instant::now());
        Ok(())
    }

    /// Wait for a slot, then run `operation`.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.acquire().await;
        operation().await
    }

    /// Run `operation` only if a slot is free right now.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` without invoking `operation`, or the operation's own error.
    pub async fn try_call<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.try_acquire().await?;
        operation().await
    }
}
