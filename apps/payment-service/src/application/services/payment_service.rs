//! Payment Service
//!
//! Charges, refunds and payment lookups. Every dependency call goes through a
//! resilience profile:
//!
//! | Call | Profile | Operation | Attempt timeout |
//! |------|---------|-----------|-----------------|
//! | charge | payment_gateway | `<gateway>` | 30s |
//! | refund | payment_gateway | `<gateway>_refund` | 60s |
//! | save / update | database | `save_payment`, `update_payment_status` | none |
//! | lookups | database | `get_payment_status`, `get_user_payments` | none |
//! | events | message_queue | `payment_events` | 10s |
//!
//! Event publishing is best-effort: the payment is already stored when the
//! event goes out, so a broker failure is logged and does not fail the call.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::application::ports::{EventPublisherPort, PaymentGatewayPort, PaymentRepositoryPort};
use crate::domain::payment::{
    Payment, PaymentEvent, PaymentEventType, PaymentRequest, PaymentStatus,
};
use crate::infrastructure::metrics::{self, PaymentOutcome};
use crate::resilience::{Classify, ResilienceError, ResilienceManager};

/// Attempt timeout for a charge.
pub const CHARGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempt timeout for a refund.
pub const REFUND_TIMEOUT: Duration = Duration::from_secs(60);

/// Attempt timeout for publishing an event.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

const EVENTS_OPERATION: &str = "payment_events";

/// Payment service errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentServiceError {
    /// The request is malformed.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// No such payment.
    #[error("payment {0} not found")]
    NotFound(String),

    /// The gateway declined the charge.
    #[error("payment {payment_id} declined: {message}")]
    Declined {
        /// Stored payment ID.
        payment_id: Uuid,
        /// Gateway message.
        message: String,
    },

    /// The payment is not in a refundable state.
    #[error("payment {payment_id} cannot be refunded in status {status}")]
    NotRefundable {
        /// Payment ID.
        payment_id: Uuid,
        /// Current status.
        status: PaymentStatus,
    },

    /// A dependency is failing or fenced off; try again later.
    #[error("service temporarily unavailable ({operation}): {reason}")]
    Unavailable {
        /// Dependency operation that failed.
        operation: String,
        /// Underlying failure.
        reason: String,
    },

    /// A dependency rejected the call for a non-transient reason.
    #[error("dependency error ({operation}): {reason}")]
    Dependency {
        /// Dependency operation that failed.
        operation: String,
        /// Underlying failure.
        reason: String,
    },
}

impl PaymentServiceError {
    /// HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Declined { .. } => 402,
            Self::NotFound(_) => 404,
            Self::NotRefundable { .. } => 409,
            Self::Dependency { .. } => 502,
            Self::Unavailable { .. } => 503,
        }
    }

    /// Whether the caller should retry later.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Map a failed resilient call.
    ///
    /// Rejections by the resilience layer and transient dependency failures
    /// become `Unavailable`; anything else becomes `Dependency`.
    pub fn from_resilience<E>(operation: &str, error: &ResilienceError<E>) -> Self
    where
        E: Classify + Display,
    {
        let reason = error.to_string();
        if error.is_rejection() || error.kind().is_transient() {
            Self::Unavailable {
                operation: operation.to_string(),
                reason,
            }
        } else {
            Self::Dependency {
                operation: operation.to_string(),
                reason,
            }
        }
    }
}

/// Payment use cases.
pub struct PaymentService {
    gateway: Arc<dyn PaymentGatewayPort>,
    repository: Arc<dyn PaymentRepositoryPort>,
    publisher: Arc<dyn EventPublisherPort>,
    resilience: Arc<ResilienceManager>,
}

impl PaymentService {
    /// Create a new payment service.
    pub fn new(
        gateway: Arc<dyn PaymentGatewayPort>,
        repository: Arc<dyn PaymentRepositoryPort>,
        publisher: Arc<dyn EventPublisherPort>,
        resilience: Arc<ResilienceManager>,
    ) -> Self {
        Self {
            gateway,
            repository,
            publisher,
            resilience,
        }
    }

    /// The shared resilience registry.
    #[must_use]
    pub const fn resilience(&self) -> &Arc<ResilienceManager> {
        &self.resilience
    }

    /// Charge a payment request and store the outcome.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed requests (the gateway is not called)
    /// - `Declined` when the gateway refuses the charge (the attempt is stored)
    /// - `Unavailable` / `Dependency` when the gateway or database fails
    pub async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<Payment, PaymentServiceError> {
        request.validate().map_err(PaymentServiceError::Validation)?;

        let payment_id = Uuid::new_v4();
        let receipt = {
            let gateway = Arc::clone(&self.gateway);
            let request = request.clone();
            self.resilience
                .payment_gateway(self.gateway.name())
                .with_timeout(CHARGE_TIMEOUT)
                .execute(move || {
                    let gateway = Arc::clone(&gateway);
                    let request = request.clone();
                    async move { gateway.charge(payment_id, &request).await }
                })
                .await
                .map_err(|e| self.dependency_failure("charge", &e))?
        };

        let (status, event_type) = if receipt.approved {
            (PaymentStatus::Completed, PaymentEventType::Completed)
        } else {
            (PaymentStatus::Failed, PaymentEventType::Failed)
        };
        let payment = Payment::from_request(
            payment_id,
            &request,
            status,
            receipt.transaction_id,
            receipt.message,
        );

        self.save(&payment, "save_payment").await?;
        self.publish(PaymentEvent::for_payment(event_type, &payment))
            .await;

        tracing::info!(
            payment_id = %payment.payment_id,
            order_id = %payment.order_id,
            status = %payment.status,
            "Payment processed"
        );

        if receipt.approved {
            metrics::record_payment(PaymentOutcome::Completed);
            Ok(payment)
        } else {
            metrics::record_payment(PaymentOutcome::Declined);
            Err(PaymentServiceError::Declined {
                payment_id,
                message: payment.message,
            })
        }
    }

    /// Look up a payment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown IDs, or a dependency error.
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, PaymentServiceError> {
        let repository = Arc::clone(&self.repository);
        self.resilience
            .database("get_payment_status")
            .execute(move || {
                let repository = Arc::clone(&repository);
                async move { repository.find_by_id(payment_id).await }
            })
            .await
            .map_err(|e| self.dependency_failure("get_payment_status", &e))?
            .ok_or_else(|| PaymentServiceError::NotFound(payment_id.to_string()))
    }

    /// List a user's payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank user ID, or a dependency error.
    pub async fn get_user_payments(
        &self,
        user_id: &str,
    ) -> Result<Vec<Payment>, PaymentServiceError> {
        if user_id.trim().is_empty() {
            return Err(PaymentServiceError::Validation(vec![
                "user_id is required".to_string(),
            ]));
        }

        let repository = Arc::clone(&self.repository);
        let user_id = user_id.to_string();
        self.resilience
            .database("get_user_payments")
            .execute(move || {
                let repository = Arc::clone(&repository);
                let user_id = user_id.clone();
                async move { repository.find_by_user(&user_id).await }
            })
            .await
            .map_err(|e| self.dependency_failure("get_user_payments", &e))
    }

    /// Refund a completed payment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NotRefundable`, or a dependency error.
    pub async fn refund_payment(&self, payment_id: Uuid) -> Result<Payment, PaymentServiceError> {
        let mut payment = self.get_payment(payment_id).await?;
        if !payment.status.is_refundable() {
            return Err(PaymentServiceError::NotRefundable {
                payment_id,
                status: payment.status,
            });
        }

        let operation = format!("{}_refund", self.gateway.name());
        let receipt = {
            let gateway = Arc::clone(&self.gateway);
            let snapshot = payment.clone();
            self.resilience
                .payment_gateway(&operation)
                .with_timeout(REFUND_TIMEOUT)
                .execute(move || {
                    let gateway = Arc::clone(&gateway);
                    let payment = snapshot.clone();
                    async move { gateway.refund(&payment).await }
                })
                .await
                .map_err(|e| self.dependency_failure("refund", &e))?
        };

        payment.transition_to(
            PaymentStatus::Refunded,
            format!("Refunded ({})", receipt.refund_id),
        );
        self.save(&payment, "update_payment_status").await?;
        self.publish(PaymentEvent::for_payment(PaymentEventType::Refunded, &payment))
            .await;

        tracing::info!(payment_id = %payment_id, refund_id = %receipt.refund_id, "Payment refunded");
        metrics::record_payment(PaymentOutcome::Refunded);

        Ok(payment)
    }

    async fn save(&self, payment: &Payment, operation: &str) -> Result<(), PaymentServiceError> {
        let repository = Arc::clone(&self.repository);
        let payment = payment.clone();
        self.resilience
            .database(operation)
            .execute(move || {
                let repository = Arc::clone(&repository);
                let payment = payment.clone();
                async move { repository.save(&payment).await }
            })
            .await
            .map_err(|e| self.dependency_failure(operation, &e))
    }

    async fn publish(&self, event: PaymentEvent) {
        let publisher = Arc::clone(&self.publisher);
        let payment_id = event.payment_id;
        let routing_key = event.event_type.routing_key();

        let result = self
            .resilience
            .message_queue(EVENTS_OPERATION)
            .with_timeout(PUBLISH_TIMEOUT)
            .execute(move || {
                let publisher = Arc::clone(&publisher);
                let event = event.clone();
                async move { publisher.publish(&event).await }
            })
            .await;

        if let Err(e) = result {
            tracing::error!(
                payment_id = %payment_id,
                routing_key,
                error = %e,
                "Failed to publish payment event"
            );
        }
    }

    fn dependency_failure<E>(&self, operation: &str, error: &ResilienceError<E>) -> PaymentServiceError
    where
        E: Classify + Display,
    {
        let mapped = PaymentServiceError::from_resilience(operation, error);
        if mapped.is_unavailable() {
            metrics::record_payment(PaymentOutcome::Unavailable);
        }
        tracing::warn!(
            operation,
            gateway = self.gateway.name(),
            error = %error,
            "Dependency call failed"
        );
        mapped
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::resilience::{
        CircuitOpenError, ErrorKind, ResilienceError, TimeoutError,
    };

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Dep(ErrorKind);

    impl Classify for Dep {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[test]
    fn test_http_status_codes() {
        let statuses: HashMap<u16, PaymentServiceError> = [
            PaymentServiceError::Validation(vec!["x".to_string()]),
            PaymentServiceError::NotFound("p".to_string()),
            PaymentServiceError::Declined {
                payment_id: Uuid::nil(),
                message: "no".to_string(),
            },
            PaymentServiceError::NotRefundable {
                payment_id: Uuid::nil(),
                status: PaymentStatus::Failed,
            },
            PaymentServiceError::Unavailable {
                operation: "charge".to_string(),
                reason: "open".to_string(),
            },
            PaymentServiceError::Dependency {
                operation: "charge".to_string(),
                reason: "bad".to_string(),
            },
        ]
        .into_iter()
        .map(|e| (e.http_status(), e))
        .collect();

        assert_eq!(statuses.len(), 6);
        assert!(statuses[&503].is_unavailable());
        assert!(!statuses[&400].is_unavailable());
    }

    #[test]
    fn test_rejections_map_to_unavailable() {
        let open: ResilienceError<Dep> = CircuitOpenError {
            name: "payment_gateway_simulated_gateway".to_string(),
        }
        .into();
        let mapped = PaymentServiceError::from_resilience("charge", &open);
        assert_eq!(mapped.http_status(), 503);
        assert!(mapped.to_string().contains("is OPEN"));

        let timeout: ResilienceError<Dep> = TimeoutError {
            operation: "charge".to_string(),
            after: CHARGE_TIMEOUT,
        }
        .into();
        assert!(PaymentServiceError::from_resilience("charge", &timeout).is_unavailable());
    }

    #[test]
    fn test_dependency_errors_map_by_kind() {
        let transient = ResilienceError::Operation(Dep(ErrorKind::Connection));
        assert!(PaymentServiceError::from_resilience("save_payment", &transient).is_unavailable());

        let rejected = ResilienceError::Operation(Dep(ErrorKind::Rejected));
        let mapped = PaymentServiceError::from_resilience("save_payment", &rejected);
        assert_eq!(mapped.http_status(), 502);
    }
}
