//! Payment Gateway Port (Driven Port)
//!
//! Interface for charging and refunding through a payment gateway. A declined
//! charge is a normal outcome ([`ChargeReceipt::approved`] is false), not an
//! error, so declines never count against the gateway's circuit breaker.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::payment::{Payment, PaymentRequest};
use crate::resilience::{Classify, ErrorKind};

/// Gateway error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Could not reach the gateway.
    #[error("Gateway connection error: {message}")]
    Connection {
        /// Details.
        message: String,
    },

    /// The gateway did not answer in time.
    #[error("Gateway timeout: {message}")]
    Timeout {
        /// Details.
        message: String,
    },

    /// The gateway reported an outage.
    #[error("Gateway unavailable: {message}")]
    Unavailable {
        /// Details.
        message: String,
    },

    /// The gateway throttled us.
    #[error("Gateway rate limit exceeded")]
    RateLimited,

    /// The gateway rejected the request as malformed.
    #[error("Gateway rejected request: {message}")]
    InvalidRequest {
        /// Details.
        message: String,
    },
}

impl Classify for GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::InvalidRequest { .. } => ErrorKind::Rejected,
        }
    }
}

/// Gateway verdict on a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    /// Whether the charge was approved.
    pub approved: bool,
    /// Gateway transaction reference, when approved.
    pub transaction_id: Option<String>,
    /// Gateway message.
    pub message: String,
}

/// Confirmation of a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    /// Gateway refund reference.
    pub refund_id: String,
}

/// Port for a payment gateway.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Gateway name, used to name its resilience operations.
    fn name(&self) -> &str;

    /// Charge the customer.
    async fn charge(
        &self,
        payment_id: Uuid,
        request: &PaymentRequest,
    ) -> Result<ChargeReceipt, GatewayError>;

    /// Refund a completed payment.
    async fn refund(&self, payment: &Payment) -> Result<RefundReceipt, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            GatewayError::Connection {
                message: "refused".to_string()
            }
            .kind(),
            ErrorKind::Connection
        );
        assert_eq!(GatewayError::RateLimited.kind(), ErrorKind::RateLimited);
        assert_eq!(
            GatewayError::InvalidRequest {
                message: "bad currency".to_string()
            }
            .kind(),
            ErrorKind::Rejected
        );
        assert!(
            GatewayError::Unavailable {
                message: "503".to_string()
            }
            .kind()
            .is_transient()
        );
    }
}
