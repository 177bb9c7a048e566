//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `PaymentService`: charges, refunds and lookups behind resilience profiles

mod payment_service;

pub use payment_service::{
    CHARGE_TIMEOUT, PUBLISH_TIMEOUT, PaymentService, PaymentServiceError, REFUND_TIMEOUT,
};
