//! Simulated Payment Gateway
//!
//! Stands in for a real card processor. Each charge waits `processing_time`
//! and is approved with probability `success_rate`. The outage switch makes
//! every call fail with [`GatewayError::Unavailable`], which is what the
//! gateway circuit breaker reacts to.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use crate::application::ports::{ChargeReceipt, GatewayError, PaymentGatewayPort, RefundReceipt};
use crate::domain::payment::{Payment, PaymentRequest};
use crate::infrastructure::config::GatewaySettings;

/// Name reported by [`SimulatedGateway`].
pub const SIMULATED_GATEWAY_NAME: &str = "simulated_gateway";

/// In-process payment gateway.
#[derive(Debug)]
pub struct SimulatedGateway {
    success_rate: f64,
    processing_time: Duration,
    available: AtomicBool,
    charges: AtomicU64,
}

impl SimulatedGateway {
    /// Create a gateway approving `success_rate` of charges after `processing_time`.
    ///
    /// The rate is clamped to `[0, 1]`; NaN counts as 0.
    #[must_use]
    pub fn new(success_rate: f64, processing_time: Duration) -> Self {
        let success_rate = if success_rate.is_nan() {
            0.0
        } else {
            success_rate.clamp(0.0, 1.0)
        };
        Self {
            success_rate,
            processing_time,
            available: AtomicBool::new(true),
            charges: AtomicU64::new(0),
        }
    }

    /// Create a gateway from configuration.
    #[must_use]
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self::new(settings.success_rate, settings.processing_time)
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            tracing::info!(gateway = SIMULATED_GATEWAY_NAME, "Simulated gateway recovered");
        } else {
            tracing::warn!(gateway = SIMULATED_GATEWAY_NAME, "Simulated gateway outage");
        }
    }

    /// Whether the gateway is currently answering.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of charge calls that reached the gateway.
    #[must_use]
    pub fn charge_count(&self) -> u64 {
        self.charges.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> Result<(), GatewayError> {
        if !self.processing_time.is_zero() {
            tokio::time::sleep(self.processing_time).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(GatewayError::Unavailable {
                message: "simulated outage".to_string(),
            })
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::from_settings(&GatewaySettings::default())
    }
}

#[async_trait]
impl PaymentGatewayPort for SimulatedGateway {
    fn name(&self) -> &str {
        SIMULATED_GATEWAY_NAME
    }

    async fn charge(
        &self,
        payment_id: Uuid,
        request: &PaymentRequest,
    ) -> Result<ChargeReceipt, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let approved = rand::rng().random_bool(self.success_rate);
        tracing::debug!(
            %payment_id,
            order_id = %request.order_id,
            amount = %request.amount,
            approved,
            "Simulated charge"
        );

        if approved {
            Ok(ChargeReceipt {
                approved: true,
                transaction_id: Some(reference("TXN")),
                message: "Payment processed successfully".to_string(),
            })
        } else {
            Ok(ChargeReceipt {
                approved: false,
                transaction_id: None,
                message: "Payment declined by gateway".to_string(),
            })
        }
    }

    async fn refund(&self, payment: &Payment) -> Result<RefundReceipt, GatewayError> {
        self.round_trip().await?;
        tracing::debug!(payment_id = %payment.payment_id, "Simulated refund");
        Ok(RefundReceipt {
            refund_id: reference("RFD"),
        })
    }
}

/// `<prefix>-` followed by 12 upper-case hex digits.
fn reference(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", simple[..12].to_uppercase())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::payment::{Currency, PaymentMethod, PaymentStatus};

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: "order-1".to_string(),
            user_id: "user-1".to_string(),
            amount: Decimal::new(4999, 2),
            currency: Currency::Usd,
            payment_method: PaymentMethod::CreditCard,
        }
    }

    #[tokio::test]
    async fn test_always_approves_at_full_rate() {
        let gateway = SimulatedGateway::new(1.0, Duration::ZERO);

        let receipt = gateway.charge(Uuid::new_v4(), &request()).await.unwrap();

        assert!(receipt.approved);
        let txn = receipt.transaction_id.unwrap();
        assert!(txn.starts_with("TXN-"));
        assert_eq!(txn.len(), 16);
        assert!(txn[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_always_declines_at_zero_rate() {
        let gateway = SimulatedGateway::new(0.0, Duration::ZERO);

        let receipt = gateway.charge(Uuid::new_v4(), &request()).await.unwrap();

        assert!(!receipt.approved);
        assert!(receipt.transaction_id.is_none());
    }

    #[test]
    fn test_rate_is_clamped() {
        let gateway = SimulatedGateway::new(3.0, Duration::ZERO);
        assert_eq!(gateway.success_rate, 1.0);
        let gateway = SimulatedGateway::new(-1.0, Duration::ZERO);
        assert_eq!(gateway.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let gateway = SimulatedGateway::new(1.0, Duration::ZERO);
        gateway.set_available(false);

        let err = gateway.charge(Uuid::new_v4(), &request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));

        let payment = Payment::from_request(
            Uuid::new_v4(),
            &request(),
            PaymentStatus::Completed,
            None,
            "ok",
        );
        assert!(gateway.refund(&payment).await.is_err());

        gateway.set_available(true);
        let refund = gateway.refund(&payment).await.unwrap();
        assert!(refund.refund_id.starts_with("RFD-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_charge_takes_processing_time() {
        let gateway = SimulatedGateway::new(1.0, Duration::from_secs(2));
        let start = tokio::time::Instant::now();

        gateway.charge(Uuid::new_v4(), &request()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
