//! Circuit breaker for dependency calls.
//!
//! Stops invoking a failing dependency once consecutive failures reach a
//! threshold, so a broken database, broker or gateway is not hammered while
//! it recovers.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (failure_count >= failure_threshold)
//! OPEN → HALF_OPEN (recovery_timeout elapsed since the last failure, on the next call)
//! HALF_OPEN → CLOSED (trial call succeeds)
//! HALF_OPEN → OPEN (trial call fails, recovery clock restarts)
//! ```
//!
//! While OPEN, calls fail with [`CircuitOpenError`] and the unit of work is
//! never invoked. HALF_OPEN admits exactly one trial call at a time; callers
//! arriving while the trial is in flight fail fast.
//!
//! # Locking
//!
//! State and counters live behind one mutex per breaker. The lock is taken to
//! admit a call and again to record its outcome, never across the call itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use payment_service::resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
//!
//! let breaker = CircuitBreaker::new("database_get_payment", CircuitBreakerConfig::default());
//!
//! let payment = breaker
//!     .call(|| async { repo.find(id).await.map_err(ResilienceError::Operation) })
//!     .await?;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::duration_secs;
use super::error::{CircuitOpenError, Classify, FailurePolicy, ResilienceError};
use crate::infrastructure::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Circuit is closed, calls flow normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Circuit is admitting a single trial call.
    HalfOpen,
}

impl CircuitBreakerState {
    /// Numeric gauge value (0 closed, 1 open, 2 half-open).
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures that open the circuit.
    pub failure_threshold: u32,
    /// Time to stay OPEN after the last failure before admitting a trial call.
    pub recovery_timeout: Duration,
    /// Which error kinds count as failures. Others pass through untouched.
    pub failure_policy: FailurePolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            failure_policy: FailurePolicy::Any,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration counting every error kind.
    #[must_use]
    pub const fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            failure_policy: FailurePolicy::Any,
        }
    }

    /// Restrict which error kinds are counted.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// Mutable breaker state, always read and written together.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallOutcome {
    Success,
    Failure,
    Ignored,
}

/// Circuit breaker guarding one named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
    state_transitions: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the CLOSED state.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        tracing::info!(
            name = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs_f64(),
            "Circuit breaker initialized"
        );
        metrics::record_circuit_breaker_state(&name, CircuitBreakerState::Closed);

        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
                last_failure_time: None,
                trial_in_flight: false,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Get the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state.
    ///
    /// OPEN is reported until a call arrives after the recovery timeout; the
    /// move to HALF_OPEN happens on that call. Use
    /// [`is_call_permitted`](Self::is_call_permitted) to ask whether such a
    /// call would be let through.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state
    }

    /// Whether a call arriving now would be admitted, without changing state.
    ///
    /// An OPEN circuit whose recovery timeout has elapsed counts as admitting:
    /// the next call becomes its trial.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock();
        self.permits(&inner)
    }

    /// Get the consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Run `operation` under circuit breaker protection.
    ///
    /// Fails with [`ResilienceError::CircuitOpen`] without invoking `operation`
    /// while the circuit is OPEN (or a HALF_OPEN trial is in flight). Otherwise
    /// the operation runs, its outcome is recorded, and its result is returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error after bookkeeping, or `CircuitOpen`.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        E: Classify,
    {
        let permit = self.admit()?;

        let result = operation().await;

        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(e) if self.config.failure_policy.matches(e.kind()) => CallOutcome::Failure,
            Err(_) => CallOutcome::Ignored,
        };
        permit.settle(outcome);

        result
    }

    /// Record a success observed outside [`call`](Self::call).
    pub fn record_success(&self) {
        self.record(CallOutcome::Success, false);
    }

    /// Record a failure observed outside [`call`](Self::call).
    pub fn record_failure(&self) {
        self.record(CallOutcome::Failure, false);
    }

    /// Force the circuit CLOSED and clear the failure count.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.last_failure_at = None;
        inner.trial_in_flight = false;
        self.transition(&mut inner, CircuitBreakerState::Closed);
    }

    /// Force the circuit OPEN, starting the recovery clock now.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());
        self.transition(&mut inner, CircuitBreakerState::Open);
    }

    /// Get a metrics snapshot for this breaker.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            accepting_calls: self.permits(&inner),
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout: self.config.recovery_timeout,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
        }
    }

    /// Decide whether a call may proceed.
    fn admit(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();

        let trial = match inner.state {
            CircuitBreakerState::Closed => false,
            CircuitBreakerState::Open => {
                if !self.recovery_elapsed(&inner) {
                    drop(inner);
                    return Err(self.reject());
                }
                self.transition(&mut inner, CircuitBreakerState::HalfOpen);
                inner.trial_in_flight = true;
                true
            }
            CircuitBreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    drop(inner);
                    return Err(self.reject());
                }
                inner.trial_in_flight = true;
                true
            }
        };
        drop(inner);

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Ok(CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn permits(&self, inner: &BreakerInner) -> bool {
        match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => self.recovery_elapsed(inner),
            CircuitBreakerState::HalfOpen => !inner.trial_in_flight,
        }
    }

    fn recovery_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .last_failure_at
            .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout)
    }

    fn reject(&self) -> CircuitOpenError {
        self.rejected_calls.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_breaker_rejected(&self.name);
        tracing::debug!(name = %self.name, "Circuit breaker rejected call");
        CircuitOpenError {
            name: self.name.clone(),
        }
    }

    /// Apply a call outcome. `trial` releases the HALF_OPEN trial slot.
    fn record(&self, outcome: CallOutcome, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
        }

        match outcome {
            CallOutcome::Success => {
                inner.failure_count = 0;
                if inner.state == CircuitBreakerState::HalfOpen {
                    self.transition(&mut inner, CircuitBreakerState::Closed);
                }
                drop(inner);
                metrics::record_circuit_breaker_success(&self.name);
            }
            CallOutcome::Failure => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.last_failure_at = Some(Instant::now());
                inner.last_failure_time = Some(Utc::now());

                let should_open = match inner.state {
                    CircuitBreakerState::Closed => {
                        inner.failure_count >= self.config.failure_threshold
                    }
                    CircuitBreakerState::HalfOpen => true,
                    CircuitBreakerState::Open => false,
                };
                if should_open {
                    self.transition(&mut inner, CircuitBreakerState::Open);
                }
                drop(inner);

                self.total_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_breaker_failure(&self.name);
            }
            CallOutcome::Ignored => {}
        }
    }

    /// Move to `to`, logging and counting real transitions only.
    fn transition(&self, inner: &mut BreakerInner, to: CircuitBreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_breaker_state(&self.name, to);

        match to {
            CircuitBreakerState::Open => tracing::warn!(
                name = %self.name,
                from = %from,
                to = %to,
                failure_count = inner.failure_count,
                "Circuit breaker opened"
            ),
            CircuitBreakerState::HalfOpen => tracing::info!(
                name = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker testing"
            ),
            CircuitBreakerState::Closed => tracing::info!(
                name = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker closed"
            ),
        }
    }
}

/// Admission ticket for one call.
///
/// Dropping an unsettled trial permit (the caller's future was cancelled)
/// frees the HALF_OPEN slot without recording an outcome.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    fn settle(mut self, outcome: CallOutcome) {
        self.settled = true;
        self.breaker.record(outcome, self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

/// Metrics snapshot for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Operation name.
    pub name: String,
    /// Current state.
    pub state: CircuitBreakerState,
    /// Whether a call arriving now would be admitted.
    pub accepting_calls: bool,
    /// Consecutive counted failures.
    pub failure_count: u32,
    /// Wall-clock time of the last counted failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Configured failure threshold.
    pub failure_threshold: u32,
    /// Configured recovery timeout, in seconds.
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,
    /// Calls admitted.
    pub total_calls: u64,
    /// Counted failures since creation.
    pub total_failures: u64,
    /// Calls rejected without being invoked.
    pub rejected_calls: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
}
