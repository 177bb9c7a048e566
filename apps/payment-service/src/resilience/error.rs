//! Failure classification and resilience errors.
//!
//! Dependency errors are classified into an [`ErrorKind`] through the
//! [`Classify`] trait. A [`FailurePolicy`] decides which kinds a circuit
//! breaker counts and which kinds a retry policy retries.
//!
//! # Error Taxonomy
//!
//! | Variant | Produced by | Unit of work invoked? |
//! |---------|-------------|-----------------------|
//! | `CircuitOpen` | Circuit breaker fast-fail | No |
//! | `Timeout` | Timeout guard | Yes (may still be running) |
//! | `BulkheadFull` | Bulkhead | No |
//! | `RateLimited` | Rate limiter | No |
//! | `TaskFailed` | Timeout guard (attempt panicked) | Yes |
//! | `Operation` | The dependency itself | Yes |

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failure, used for circuit and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call exceeded its time bound.
    Timeout,
    /// Connection refused, reset, or otherwise broken.
    Connection,
    /// The dependency reported itself unavailable (5xx, broker down).
    Unavailable,
    /// The dependency throttled the caller.
    RateLimited,
    /// The dependency rejected the request (validation, decline).
    Rejected,
    /// Anything else.
    Internal,
    /// A circuit breaker refused the call.
    CircuitOpen,
    /// A bulkhead had no free permit.
    BulkheadFull,
}

impl ErrorKind {
    /// Whether this kind usually clears up on its own.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::Unavailable | Self::RateLimited
        )
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::Rejected => "rejected",
            Self::Internal => "internal",
            Self::CircuitOpen => "circuit_open",
            Self::BulkheadFull => "bulkhead_full",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    /// Classify this error. Defaults to [`ErrorKind::Internal`].
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

impl Classify for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;

        match std::io::Error::kind(self) {
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe => ErrorKind::Connection,
            _ => ErrorKind::Internal,
        }
    }
}

/// Which error kinds a policy applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Every kind matches.
    #[default]
    Any,
    /// Only the listed kinds match.
    Only(HashSet<ErrorKind>),
    /// Every kind except the listed ones matches.
    AllExcept(HashSet<ErrorKind>),
}

impl FailurePolicy {
    /// Policy matching exactly the given kinds.
    #[must_use]
    pub fn only(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    /// Policy matching everything but the given kinds.
    #[must_use]
    pub fn all_except(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self::AllExcept(kinds.into_iter().collect())
    }

    /// Policy matching the transient kinds only.
    #[must_use]
    pub fn transient() -> Self {
        Self::only([
            ErrorKind::Timeout,
            ErrorKind::Connection,
            ErrorKind::Unavailable,
            ErrorKind::RateLimited,
        ])
    }

    /// Check whether `kind` is covered by this policy.
    #[must_use]
    pub fn matches(&self, kind: ErrorKind) -> bool {
        match self {
            Self::Any => true,
            Self::Only(kinds) => kinds.contains(&kind),
            Self::AllExcept(kinds) => !kinds.contains(&kind),
        }
    }
}

/// A circuit breaker rejected the call without invoking it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is OPEN")]
pub struct CircuitOpenError {
    /// Breaker (operation) name.
    pub name: String,
}

/// The unit of work did not finish within its bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{operation}' timed out after {}ms", .after.as_millis())]
pub struct TimeoutError {
    /// Operation name.
    pub operation: String,
    /// The bound that was exceeded.
    pub after: Duration,
}

/// A bulkhead had no free permit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bulkhead limit of {max_concurrent} reached for '{name}'")]
pub struct BulkheadFullError {
    /// Bulkhead (operation) name.
    pub name: String,
    /// Configured concurrency cap.
    pub max_concurrent: usize,
}

/// A rate limiter refused the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limiter '{name}' refused the call")]
pub struct RateLimitedError {
    /// Limiter (operation) name.
    pub name: String,
}

/// The spawned attempt panicked or was cancelled by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{operation}' task failed: {reason}")]
pub struct TaskFailedError {
    /// Operation name.
    pub operation: String,
    /// Panic message or cancellation note.
    pub reason: String,
}

/// Error returned by every resilience primitive.
///
/// Resilience-manufactured failures carry the operation name; dependency
/// failures pass through untouched in [`ResilienceError::Operation`].
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// Fail-fast rejection from an open circuit.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// The per-attempt time bound was exceeded.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// No bulkhead permit was available.
    #[error(transparent)]
    BulkheadFull(#[from] BulkheadFullError),

    /// The rate limiter refused the call.
    #[error(transparent)]
    RateLimited(#[from] RateLimitedError),

    /// The attempt's task died before producing a result.
    #[error(transparent)]
    TaskFailed(#[from] TaskFailedError),

    /// The dependency itself failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// Whether the resilience layer refused or cut short the call.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen(_) | Self::Timeout(_) | Self::BulkheadFull(_) | Self::RateLimited(_)
        )
    }

    /// Whether this is a circuit-open fast failure.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }

    /// Whether this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Borrow the dependency error, if that is what this is.
    #[must_use]
    pub const fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the dependency error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Convert the dependency error type, keeping resilience variants as they are.
    pub fn map_operation<F, E2>(self, f: F) -> ResilienceError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::CircuitOpen(e) => ResilienceError::CircuitOpen(e),
            Self::Timeout(e) => ResilienceError::Timeout(e),
            Self::BulkheadFull(e) => ResilienceError::BulkheadFull(e),
            Self::RateLimited(e) => ResilienceError::RateLimited(e),
            Self::TaskFailed(e) => ResilienceError::TaskFailed(e),
            Self::Operation(e) => ResilienceError::Operation(f(e)),
        }
    }
}

impl<E: Classify> Classify for ResilienceError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::BulkheadFull(_) => ErrorKind::BulkheadFull,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::TaskFailed(_) => ErrorKind::Internal,
            Self::Operation(e) => e.kind(),
        }
    }
}
