//! In-Memory Event Publisher
//!
//! Serializes each event to JSON the way a broker client would, then keeps
//! it in a local log instead of sending it.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{EventPublishError, EventPublisherPort};
use crate::domain::payment::PaymentEvent;

/// A published message: routing key plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Routing key.
    pub routing_key: &'static str,
    /// JSON body.
    pub body: String,
}

/// Event publisher that records messages in memory.
#[derive(Debug)]
pub struct InMemoryEventPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    connected: AtomicBool,
}

impl InMemoryEventPublisher {
    /// Create a connected publisher with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Messages published so far, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }

    /// Events published so far, decoded from their bodies.
    #[must_use]
    pub fn events(&self) -> Vec<PaymentEvent> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| serde_json::from_str(&m.body).ok())
            .collect()
    }

    /// Drop (`false`) or restore (`true`) the broker connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for InMemoryEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisherPort for InMemoryEventPublisher {
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventPublishError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(EventPublishError::ConnectionError {
                message: "broker connection lost".to_string(),
            });
        }

        let body =
            serde_json::to_string(event).map_err(|e| EventPublishError::SerializationError {
                message: e.to_string(),
            })?;
        let routing_key = event.event_type.routing_key();

        tracing::debug!(routing_key, payment_id = %event.payment_id, "Event published");
        self.messages
            .lock()
            .push(PublishedMessage { routing_key, body });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::domain::payment::{
        Currency, Payment, PaymentEventType, PaymentMethod, PaymentRequest, PaymentStatus,
    };

    fn event() -> PaymentEvent {
        let request = PaymentRequest {
            order_id: "order-9".to_string(),
            user_id: "carol".to_string(),
            amount: Decimal::new(2500, 2),
            currency: Currency::Eur,
            payment_method: PaymentMethod::Paypal,
        };
        let payment = Payment::from_request(
            Uuid::new_v4(),
            &request,
            PaymentStatus::Completed,
            Some("TXN-ABC".to_string()),
            "ok",
        );
        PaymentEvent::for_payment(PaymentEventType::Completed, &payment)
    }

    #[tokio::test]
    async fn test_records_json_under_routing_key() {
        let publisher = InMemoryEventPublisher::new();
        let event = event();

        publisher.publish(&event).await.unwrap();

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].routing_key, "payment.completed");
        let body: serde_json::Value = serde_json::from_str(&messages[0].body).unwrap();
        assert_eq!(body["event_type"], "payment.completed");
        assert_eq!(body["currency"], "EUR");
        assert_eq!(publisher.events(), vec![event]);
    }

    #[tokio::test]
    async fn test_disconnected_publisher_fails() {
        let publisher = InMemoryEventPublisher::new();
        publisher.set_connected(false);

        let err = publisher.publish(&event()).await.unwrap_err();

        assert!(matches!(err, EventPublishError::ConnectionError { .. }));
        assert!(publisher.messages().is_empty());
    }
}
