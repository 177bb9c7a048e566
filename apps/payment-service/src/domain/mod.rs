//! Domain Layer - Payment types and business rules.
//!
//! Pure data types with serialization support and no I/O.

/// Payments, requests and payment events.
pub mod payment;
