//! Prometheus Metrics Module
//!
//! Exposes resilience and payment metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Circuit breakers**: state gauge plus success, failure and rejection counts
//! - **Retries**: retry attempts and exhausted retry budgets
//! - **Guards**: attempt timeouts and bulkhead rejections
//! - **Payments**: processed payments by outcome
//!
//! Every resilience metric is labelled with the operation name. Recording is a
//! no-op until [`init_metrics`] installs the recorder.
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::resilience::CircuitBreakerState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_gauge!(
        "payment_service_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half_open)"
    );
    describe_counter!(
        "payment_service_circuit_breaker_failures_total",
        "Failures counted by circuit breakers"
    );
    describe_counter!(
        "payment_service_circuit_breaker_success_total",
        "Successful calls through circuit breakers"
    );
    describe_counter!(
        "payment_service_circuit_breaker_rejected_total",
        "Calls rejected by an open circuit"
    );

    describe_counter!(
        "payment_service_retry_attempts_total",
        "Retries scheduled after a failed attempt"
    );
    describe_counter!(
        "payment_service_retry_exhausted_total",
        "Calls that failed after using every attempt"
    );

    describe_counter!(
        "payment_service_timeouts_total",
        "Attempts that exceeded their time bound"
    );
    describe_counter!(
        "payment_service_bulkhead_rejected_total",
        "Calls rejected by a full bulkhead"
    );

    describe_counter!(
        "payment_service_payments_total",
        "Payments processed by outcome"
    );
}

// =============================================================================
// Circuit Breaker Metrics
// =============================================================================

/// Update the circuit breaker state gauge.
pub fn record_circuit_breaker_state(operation: &str, state: CircuitBreakerState) {
    gauge!(
        "payment_service_circuit_breaker_state",
        "operation" => operation.to_string()
    )
    .set(state.as_gauge());
}

/// Record a failure counted by a circuit breaker.
pub fn record_circuit_breaker_failure(operation: &str) {
    counter!(
        "payment_service_circuit_breaker_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a successful call through a circuit breaker.
pub fn record_circuit_breaker_success(operation: &str) {
    counter!(
        "payment_service_circuit_breaker_success_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a call rejected because the circuit was open.
pub fn record_circuit_breaker_rejected(operation: &str) {
    counter!(
        "payment_service_circuit_breaker_rejected_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// =============================================================================
// Retry and Guard Metrics
// =============================================================================

/// Record a scheduled retry.
pub fn record_retry_attempt(operation: &str) {
    counter!(
        "payment_service_retry_attempts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a call that used its whole retry budget.
pub fn record_retry_exhausted(operation: &str) {
    counter!(
        "payment_service_retry_exhausted_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record an attempt timeout.
pub fn record_timeout(operation: &str) {
    counter!(
        "payment_service_timeouts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a bulkhead rejection.
pub fn record_bulkhead_rejected(operation: &str) {
    counter!(
        "payment_service_bulkhead_rejected_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// =============================================================================
// Payment Metrics
// =============================================================================

/// Metric labels for payment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Gateway accepted the charge.
    Completed,
    /// Gateway declined the charge.
    Declined,
    /// A dependency was unavailable.
    Unavailable,
    /// Refund issued.
    Refunded,
}

impl PaymentOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Unavailable => "unavailable",
            Self::Refunded => "refunded",
        }
    }
}

/// Record a processed payment.
pub fn record_payment(outcome: PaymentOutcome) {
    counter!(
        "payment_service_payments_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_outcome_as_str() {
        assert_eq!(PaymentOutcome::Completed.as_str(), "completed");
        assert_eq!(PaymentOutcome::Declined.as_str(), "declined");
        assert_eq!(PaymentOutcome::Unavailable.as_str(), "unavailable");
        assert_eq!(PaymentOutcome::Refunded.as_str(), "refunded");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_circuit_breaker_state("database_x", CircuitBreakerState::HalfOpen);
        record_circuit_breaker_failure("database_x");
        record_circuit_breaker_success("database_x");
        record_circuit_breaker_rejected("database_x");
        record_retry_attempt("database_x");
        record_retry_exhausted("database_x");
        record_timeout("database_x");
        record_bulkhead_rejected("database_x");
        record_payment(PaymentOutcome::Completed);
    }
}
