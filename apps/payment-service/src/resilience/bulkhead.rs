//! Concurrency cap for one dependency.
//!
//! A bulkhead never queues: when every permit is taken the call is rejected
//! with [`BulkheadFullError`] and the unit of work is not invoked.

use std::future::Future;

use tokio::sync::{Semaphore, SemaphorePermit};

use super::error::{BulkheadFullError, ResilienceError};
use crate::infrastructure::metrics;

/// Non-blocking concurrency limiter.
#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    max_concurrent: usize,
    semaphore: Semaphore,
}

impl Bulkhead {
    /// Create a bulkhead allowing `max_concurrent` calls in flight.
    #[must_use]
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrent,
            semaphore: Semaphore::new(max_concurrent),
        }
    }

    /// Get the bulkhead name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured concurrency cap.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Take a permit if one is free. The slot is released when the permit drops.
    ///
    /// # Errors
    ///
    /// Returns [`BulkheadFullError`] when every permit is in use.
    pub fn try_enter(&self) -> Result<SemaphorePermit<'_>, BulkheadFullError> {
        self.semaphore.try_acquire().map_err(|_| {
            tracing::warn!(
                name = %self.name,
                max_concurrent = self.max_concurrent,
                "Bulkhead full, rejecting call"
            );
            metrics::record_bulkhead_rejected(&self.name);
            BulkheadFullError {
                name: self.name.clone(),
                max_concurrent: self.max_concurrent,
            }
        })
    }

    /// Run `operation` while holding a permit.
    ///
    /// # Errors
    ///
    /// Returns `BulkheadFull` without invoking `operation`, or the operation's own error.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        let _permit = self.try_enter()?;
        operation().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("db down")]
    struct DbError;

    #[tokio::test]
    async fn test_rejects_when_full() {
        let bulkhead = Arc::new(Bulkhead::new("database", 1));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = Arc::clone(&bulkhead);
        let occupant = tokio::spawn(async move {
            holder
                .call(move || async move {
                    let _ = release_rx.await;
                    Ok::<_, ResilienceError<DbError>>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(bulkhead.available(), 0);

        let mut invoked = false;
        let err = bulkhead
            .call(|| {
                invoked = true;
                async { Ok::<_, ResilienceError<DbError>>(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::BulkheadFull(ref e) if e.max_concurrent == 1));
        assert!(!invoked);

        release_tx.send(()).unwrap();
        occupant.await.unwrap().unwrap();
        assert_eq!(bulkhead.available(), 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_error() {
        let bulkhead = Bulkhead::new("database", 2);
        let result: Result<(), _> = bulkhead
            .call(|| async { Err(ResilienceError::Operation(DbError)) })
            .await;
        assert!(matches!(result, Err(ResilienceError::Operation(DbError))));
        assert_eq!(bulkhead.available(), 2);
        assert_eq!(bulkhead.max_concurrent(), 2);
    }
}
