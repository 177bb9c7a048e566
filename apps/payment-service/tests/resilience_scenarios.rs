//! Resilience Scenario Integration Tests
//!
//! Drives breakers, retry policies and the composed wrapper through the
//! public API with a paused clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use payment_service::resilience::{
    Bulkhead, CircuitBreakerConfig, CircuitBreakerState, Classify, ErrorKind, FailurePolicy,
    ResilienceError, ResilienceManager, ResilienceProfile, RetryConfig,
};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("inventory service error: {0}")]
struct InventoryError(&'static str);

impl Classify for InventoryError {
    fn kind(&self) -> ErrorKind {
        match self.0 {
            "refused" => ErrorKind::Connection,
            "bad sku" => ErrorKind::Rejected,
            _ => ErrorKind::Unavailable,
        }
    }
}

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_fails_fast_then_recovers() {
    let manager = ResilienceManager::new();
    let breaker = manager.get_circuit_breaker(
        "inventory_reserve",
        CircuitBreakerConfig::new(2, Duration::from_secs(30)),
    );
    let invocations = counter();

    for _ in 0..2 {
        let calls = Arc::clone(&invocations);
        let result = breaker
            .call(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ResilienceError::Operation(InventoryError("down")))
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::Operation(_))));
    }
    assert_eq!(breaker.state(), CircuitBreakerState::Open);

    let calls = Arc::clone(&invocations);
    let result = breaker
        .call(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ResilienceError<InventoryError>>("reserved")
        })
        .await;
    match result {
        Err(ResilienceError::CircuitOpen(e)) => assert_eq!(e.name, "inventory_reserve"),
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    tokio::time::advance(Duration::from_secs(31)).await;

    let calls = Arc::clone(&invocations);
    let result = breaker
        .call(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ResilienceError<InventoryError>>("reserved")
        })
        .await;
    assert_eq!(result.unwrap(), "reserved");
    assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    assert_eq!(breaker.failure_count(), 0);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_restarts_recovery_clock() {
    let manager = ResilienceManager::new();
    let breaker = manager.get_circuit_breaker(
        "inventory_lookup",
        CircuitBreakerConfig::new(1, Duration::from_secs(10)),
    );
    let fail = || async { Err::<(), _>(ResilienceError::Operation(InventoryError("down"))) };

    let _ = breaker.call(fail).await;
    assert_eq!(breaker.state(), CircuitBreakerState::Open);

    tokio::time::advance(Duration::from_secs(11)).await;
    let _ = breaker.call(fail).await;
    assert_eq!(breaker.state(), CircuitBreakerState::Open);

    tokio::time::advance(Duration::from_secs(5)).await;
    let result = breaker.call(fail).await;
    assert!(result.unwrap_err().is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn test_retry_makes_exactly_three_attempts_with_backoff() {
    let manager = ResilienceManager::new();
    let policy = manager.get_retry_policy(
        "inventory_sync",
        RetryConfig::new(3, Duration::from_secs(1), Duration::from_secs(60), 2.0).with_jitter(false),
    );
    let invocations = counter();
    let start = Instant::now();

    let calls = Arc::clone(&invocations);
    let result = policy
        .execute(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let reason = if n == 2 { "refused" } else { "down" };
                Err::<(), _>(ResilienceError::Operation(InventoryError(reason)))
            }
        })
        .await;

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= Duration::from_secs(3));
    match result {
        Err(ResilienceError::Operation(e)) => assert_eq!(e, InventoryError("refused")),
        other => panic!("expected the last attempt's error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_jittered_retry_waits_at_least_half_the_backoff() {
    let manager = ResilienceManager::new();
    let policy = manager.get_retry_policy(
        "inventory_jitter",
        RetryConfig::new(3, Duration::from_secs(1), Duration::from_secs(60), 2.0),
    );
    let start = Instant::now();

    let _ = policy
        .execute(|| async { Err::<(), _>(ResilienceError::Operation(InventoryError("down"))) })
        .await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn test_registry_returns_shared_instances() {
    let manager = ResilienceManager::new();

    let a = manager.get_circuit_breaker("x", CircuitBreakerConfig::default());
    let b =
        manager.get_circuit_breaker("x", CircuitBreakerConfig::new(1, Duration::from_secs(1)));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(b.config().failure_threshold, 5);

    a.force_open();
    assert_eq!(b.state(), CircuitBreakerState::Open);

    let p1 = manager.get_retry_policy("x", RetryConfig::default());
    let p2 = manager.get_retry_policy("x", RetryConfig::default());
    assert!(Arc::ptr_eq(&p1, &p2));
}

#[tokio::test(start_paused = true)]
async fn test_wrapper_counts_one_failure_per_call() {
    let manager = ResilienceManager::new();
    let operation = manager.database("reserve_stock");
    let invocations = counter();

    let calls = Arc::clone(&invocations);
    let result = operation
        .execute(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(InventoryError("down")) }
        })
        .await;

    assert!(matches!(result, Err(ResilienceError::Operation(_))));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(operation.circuit_breaker().failure_count(), 1);
    assert_eq!(operation.circuit_breaker().name(), "database_reserve_stock");
}

#[tokio::test(start_paused = true)]
async fn test_gateway_profile_opens_after_three_failed_calls() {
    let manager = ResilienceManager::new();
    let invocations = counter();

    for _ in 0..3 {
        let calls = Arc::clone(&invocations);
        let _ = manager
            .payment_gateway("acme")
            .execute(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(InventoryError("down")) }
            })
            .await;
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 6);

    let calls = Arc::clone(&invocations);
    let result = manager
        .payment_gateway("acme")
        .execute(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, InventoryError>(()) }
        })
        .await;

    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(invocations.load(Ordering::SeqCst), 6);

    let metrics = manager.get_metrics();
    let snapshot = &metrics.circuit_breakers["payment_gateway_acme"];
    assert_eq!(snapshot.state, CircuitBreakerState::Open);
    assert_eq!(snapshot.recovery_timeout, Duration::from_secs(120));
    assert_eq!(metrics.open_circuits().collect::<Vec<_>>(), vec!["payment_gateway_acme"]);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retried_then_surfaced() {
    let manager = ResilienceManager::new();
    let operation = manager
        .message_queue("publish_stock_event")
        .with_timeout(Duration::from_secs(10));
    let invocations = counter();

    let calls = Arc::clone(&invocations);
    let result = operation
        .execute(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, InventoryError>(())
            }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(
        err.to_string(),
        "operation 'message_queue_publish_stock_event' timed out after 10000ms"
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_ignored_error_kinds_leave_breaker_alone() {
    let manager = ResilienceManager::new();
    let breaker = manager.get_circuit_breaker(
        "inventory_validate",
        CircuitBreakerConfig::new(1, Duration::from_secs(30))
            .with_failure_policy(FailurePolicy::transient()),
    );

    let result = breaker
        .call(|| async { Err::<(), _>(ResilienceError::Operation(InventoryError("bad sku"))) })
        .await;

    assert!(matches!(result, Err(ResilienceError::Operation(_))));
    assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test]
async fn test_full_bulkhead_rejects_before_breaker() {
    let manager = ResilienceManager::new();
    let bulkhead = Arc::new(Bulkhead::new("inventory_bulk", 1));
    let operation = manager
        .external_api("inventory_bulk")
        .with_bulkhead(Arc::clone(&bulkhead));
    let _held = bulkhead.try_enter().unwrap();

    let result = operation
        .execute(|| async { Ok::<_, InventoryError>(()) })
        .await;

    assert!(matches!(result, Err(ResilienceError::BulkheadFull(_))));
    assert_eq!(operation.circuit_breaker().failure_count(), 0);
}

#[tokio::test]
async fn test_observe_feeds_breaker_without_gating() {
    let manager = ResilienceManager::new();

    for _ in 0..5 {
        let result = manager
            .observe("inventory_health", || async { Err::<(), _>(InventoryError("down")) })
            .await;
        assert!(result.is_err());
    }
    let breaker = manager.circuit_breaker("inventory_health").unwrap();
    assert_eq!(breaker.state(), CircuitBreakerState::Open);

    let value = manager
        .observe("inventory_health", || async { Ok::<_, InventoryError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(breaker.failure_count(), 0);

    manager.reset_all();
    assert_eq!(breaker.state(), CircuitBreakerState::Closed);
}

#[test]
fn test_profile_table_matches_defaults() {
    let gateway = ResilienceProfile::PaymentGateway.defaults();
    assert_eq!(gateway.circuit_breaker.failure_threshold, 3);
    assert_eq!(gateway.circuit_breaker.recovery_timeout, Duration::from_secs(120));
    assert_eq!(gateway.retry.max_attempts, 2);

    let queue = ResilienceProfile::MessageQueue.defaults();
    assert_eq!(queue.retry.max_attempts, 5);
    assert_eq!(queue.retry.max_delay, Duration::from_secs(15));
}
