//! Payment Flow Integration Tests
//!
//! Charges, refunds and lookups against in-memory adapters, including how
//! dependency failures surface at the service boundary.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use payment_service::application::ports::{
    ChargeReceipt, GatewayError, PaymentGatewayPort, RefundReceipt,
};
use payment_service::domain::payment::{
    Currency, Payment, PaymentEventType, PaymentMethod, PaymentRequest, PaymentStatus,
};
use payment_service::infrastructure::gateway::SimulatedGateway;
use payment_service::infrastructure::messaging::InMemoryEventPublisher;
use payment_service::infrastructure::persistence::InMemoryPaymentRepository;
use payment_service::resilience::CircuitBreakerState;
use payment_service::{PaymentService, PaymentServiceError, ResilienceManager};

struct Harness {
    service: PaymentService,
    repository: Arc<InMemoryPaymentRepository>,
    publisher: Arc<InMemoryEventPublisher>,
    resilience: Arc<ResilienceManager>,
}

fn harness(gateway: Arc<dyn PaymentGatewayPort>) -> Harness {
    let repository = Arc::new(InMemoryPaymentRepository::new());
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let resilience = Arc::new(ResilienceManager::new());
    let service = PaymentService::new(
        gateway,
        repository.clone(),
        publisher.clone(),
        Arc::clone(&resilience),
    );
    Harness {
        service,
        repository,
        publisher,
        resilience,
    }
}

fn request(user_id: &str) -> PaymentRequest {
    PaymentRequest {
        order_id: format!("order-{}", Uuid::new_v4()),
        user_id: user_id.to_string(),
        amount: Decimal::new(12_950, 2),
        currency: Currency::Usd,
        payment_method: PaymentMethod::CreditCard,
    }
}

/// Gateway that fails every call with a fixed error.
struct BrokenGateway {
    error: GatewayError,
    calls: AtomicU32,
}

impl BrokenGateway {
    fn new(error: GatewayError) -> Self {
        Self {
            error,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for BrokenGateway {
    fn name(&self) -> &str {
        "broken_gateway"
    }

    async fn charge(
        &self,
        _payment_id: Uuid,
        _request: &PaymentRequest,
    ) -> Result<ChargeReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn refund(&self, _payment: &Payment) -> Result<RefundReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[tokio::test]
async fn test_approved_charge_is_stored_and_announced() {
    let h = harness(Arc::new(SimulatedGateway::new(1.0, Duration::ZERO)));
    let request = request("alice");

    let payment = h.service.process_payment(request.clone()).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.order_id, request.order_id);
    assert!(payment.transaction_id.as_deref().unwrap().starts_with("TXN-"));
    assert_eq!(h.service.get_payment(payment.payment_id).await.unwrap(), payment);
    assert_eq!(h.service.get_user_payments("alice").await.unwrap(), vec![payment.clone()]);

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, PaymentEventType::Completed);
    assert_eq!(events[0].payment_id, payment.payment_id);
}

#[tokio::test]
async fn test_declined_charge_is_stored_but_not_counted_as_gateway_failure() {
    let h = harness(Arc::new(SimulatedGateway::new(0.0, Duration::ZERO)));

    let err = h.service.process_payment(request("bob")).await.unwrap_err();

    let PaymentServiceError::Declined { payment_id, .. } = &err else {
        panic!("expected Declined, got {err:?}");
    };
    assert_eq!(err.http_status(), 402);
    let stored = h.service.get_payment(*payment_id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(h.publisher.events()[0].event_type, PaymentEventType::Failed);

    let breaker = h
        .resilience
        .circuit_breaker("payment_gateway_simulated_gateway")
        .unwrap();
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test]
async fn test_invalid_request_never_reaches_gateway() {
    let gateway = Arc::new(SimulatedGateway::new(1.0, Duration::ZERO));
    let h = harness(gateway.clone());
    let mut bad = request("");
    bad.amount = Decimal::ZERO;

    let err = h.service.process_payment(bad).await.unwrap_err();

    match &err {
        PaymentServiceError::Validation(problems) => assert_eq!(problems.len(), 2),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert_eq!(err.http_status(), 400);
    assert_eq!(gateway.charge_count(), 0);
    assert!(h.repository.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_gateway_outage_opens_circuit_and_fails_fast() {
    let gateway = Arc::new(SimulatedGateway::new(1.0, Duration::ZERO));
    gateway.set_available(false);
    let h = harness(gateway.clone());

    for _ in 0..3 {
        let err = h.service.process_payment(request("carol")).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.http_status(), 503);
    }
    assert_eq!(gateway.charge_count(), 6);

    let err = h.service.process_payment(request("carol")).await.unwrap_err();
    match &err {
        PaymentServiceError::Unavailable { operation, reason } => {
            assert_eq!(operation, "charge");
            assert!(reason.contains("is OPEN"), "{reason}");
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(gateway.charge_count(), 6);

    let metrics = h.resilience.get_metrics();
    assert_eq!(
        metrics.circuit_breakers["payment_gateway_simulated_gateway"].state,
        CircuitBreakerState::Open
    );
    assert!(h.repository.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_request_maps_to_dependency_error() {
    let gateway = Arc::new(BrokenGateway::new(GatewayError::InvalidRequest {
        message: "unsupported card".to_string(),
    }));
    let h = harness(gateway.clone());

    let err = h.service.process_payment(request("dave")).await.unwrap_err();

    assert!(matches!(err, PaymentServiceError::Dependency { .. }));
    assert_eq!(err.http_status(), 502);
    assert!(err.to_string().contains("unsupported card"));
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_refund_flow() {
    let h = harness(Arc::new(SimulatedGateway::new(1.0, Duration::ZERO)));
    let payment = h.service.process_payment(request("erin")).await.unwrap();

    let refunded = h.service.refund_payment(payment.payment_id).await.unwrap();

    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert!(refunded.message.contains("RFD-"));
    assert_eq!(
        h.service.get_payment(payment.payment_id).await.unwrap().status,
        PaymentStatus::Refunded
    );
    assert_eq!(
        h.publisher.events().last().unwrap().event_type,
        PaymentEventType::Refunded
    );
    assert!(
        h.resilience
            .circuit_breaker("payment_gateway_simulated_gateway_refund")
            .is_some()
    );

    let err = h.service.refund_payment(payment.payment_id).await.unwrap_err();
    assert!(matches!(err, PaymentServiceError::NotRefundable { .. }));
    assert_eq!(err.http_status(), 409);

    let err = h.service.refund_payment(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PaymentServiceError::NotFound(_)));
    assert_eq!(err.http_status(), 404);
}

#[tokio::test(start_paused = true)]
async fn test_broker_outage_does_not_fail_payment() {
    let h = harness(Arc::new(SimulatedGateway::new(1.0, Duration::ZERO)));
    h.publisher.set_connected(false);

    let payment = h.service.process_payment(request("frank")).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(h.publisher.messages().is_empty());
    assert_eq!(h.repository.len(), 1);
    let breaker = h
        .resilience
        .circuit_breaker("message_queue_payment_events")
        .unwrap();
    assert_eq!(breaker.failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_database_outage_is_unavailable() {
    let h = harness(Arc::new(SimulatedGateway::new(1.0, Duration::ZERO)));
    h.repository.set_online(false);

    let err = h.service.process_payment(request("grace")).await.unwrap_err();

    match &err {
        PaymentServiceError::Unavailable { operation, .. } => {
            assert_eq!(operation, "save_payment");
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert!(h.publisher.messages().is_empty());

    let err = h.service.get_user_payments("grace").await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_blank_user_is_rejected() {
    let h = harness(Arc::new(SimulatedGateway::new(1.0, Duration::ZERO)));

    let err = h.service.get_user_payments("  ").await.unwrap_err();

    assert!(matches!(err, PaymentServiceError::Validation(_)));
}
