//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (gateway, database, broker).
pub mod ports;

/// Application services for payment processing.
pub mod services;
