//! Payment types.
//!
//! Requests, stored payment records and the events published about them.
//! Amounts use `rust_decimal` and are validated against fixed limits before
//! anything reaches the gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest accepted amount (0.01).
pub const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest accepted amount (1,000,000.00).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

// =============================================================================
// Enumerations
// =============================================================================

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Accepted, not yet settled.
    Pending,
    /// Charged successfully.
    Completed,
    /// Declined or errored.
    Failed,
    /// Charged, then refunded.
    Refunded,
    /// Cancelled before settlement.
    Cancelled,
}

impl PaymentStatus {
    /// Status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a refund may be issued.
    #[must_use]
    pub const fn is_refundable(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Credit card.
    #[default]
    CreditCard,
    /// Debit card.
    DebitCard,
    /// `PayPal` wallet.
    Paypal,
    /// Bank transfer.
    BankTransfer,
}

/// Supported settlement currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar.
    #[default]
    Usd,
    /// Euro.
    Eur,
    /// Pound sterling.
    Gbp,
    /// Canadian dollar.
    Cad,
    /// Australian dollar.
    Aud,
}

// =============================================================================
// Requests and Records
// =============================================================================

/// Incoming charge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Order being paid for.
    pub order_id: String,
    /// Paying user.
    pub user_id: String,
    /// Amount to charge.
    pub amount: Decimal,
    /// Currency of `amount`.
    #[serde(default)]
    pub currency: Currency,
    /// Payment method.
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl PaymentRequest {
    /// Check the request, collecting every problem found.
    ///
    /// # Errors
    ///
    /// Returns one message per invalid field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.order_id.trim().is_empty() {
            errors.push("order_id is required".to_string());
        }
        if self.user_id.trim().is_empty() {
            errors.push("user_id is required".to_string());
        }
        if self.amount < MIN_AMOUNT || self.amount > MAX_AMOUNT {
            errors.push(format!(
                "amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}, got {}",
                self.amount
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// A stored payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identifier.
    pub payment_id: Uuid,
    /// Order being paid for.
    pub order_id: String,
    /// Paying user.
    pub user_id: String,
    /// Charged amount.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Current status.
    pub status: PaymentStatus,
    /// Gateway transaction reference, when approved.
    pub transaction_id: Option<String>,
    /// Human-readable outcome.
    pub message: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Build a record from a request and the gateway's verdict.
    #[must_use]
    pub fn from_request(
        payment_id: Uuid,
        request: &PaymentRequest,
        status: PaymentStatus,
        transaction_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            payment_id,
            order_id: request.order_id.clone(),
            user_id: request.user_id.clone(),
            amount: request.amount,
            currency: request.currency,
            payment_method: request.payment_method,
            status,
            transaction_id,
            message: message.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`, stamping the update time.
    pub fn transition_to(&mut self, status: PaymentStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Events
// =============================================================================

/// Kind of payment event published to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEventType {
    /// Charge approved.
    #[serde(rename = "payment.completed")]
    Completed,
    /// Charge declined.
    #[serde(rename = "payment.failed")]
    Failed,
    /// Refund issued.
    #[serde(rename = "payment.refunded")]
    Refunded,
}

impl PaymentEventType {
    /// Routing key for the event.
    #[must_use]
    pub const fn routing_key(self) -> &'static str {
        match self {
            Self::Completed => "payment.completed",
            Self::Failed => "payment.failed",
            Self::Refunded => "payment.refunded",
        }
    }
}

/// Event describing a payment state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Event kind.
    pub event_type: PaymentEventType,
    /// Payment identifier.
    pub payment_id: Uuid,
    /// Order identifier.
    pub order_id: String,
    /// User identifier.
    pub user_id: String,
    /// Amount involved.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Payment status after the change.
    pub status: PaymentStatus,
    /// When the change happened.
    pub occurred_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// Event for the current state of `payment`.
    #[must_use]
    pub fn for_payment(event_type: PaymentEventType, payment: &Payment) -> Self {
        Self {
            event_type,
            payment_id: payment.payment_id,
            order_id: payment.order_id.clone(),
            user_id: payment.user_id.clone(),
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            occurred_at: Utc::now(),
        }
    }
}
