//! Port Interfaces
//!
//! Contracts the payment service needs from its dependencies. Every port
//! error implements [`Classify`](crate::resilience::Classify) so the
//! resilience layer can decide what to count and what to retry.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PaymentGatewayPort`: charge and refund
//! - `PaymentRepositoryPort`: payment persistence
//! - `EventPublisherPort`: payment events to the broker

mod event_publisher_port;
mod payment_gateway_port;
mod payment_repository_port;

pub use event_publisher_port::{EventPublishError, EventPublisherPort, NoOpEventPublisher};
pub use payment_gateway_port::{ChargeReceipt, GatewayError, PaymentGatewayPort, RefundReceipt};
pub use payment_repository_port::{PaymentRepositoryPort, RepositoryError};
