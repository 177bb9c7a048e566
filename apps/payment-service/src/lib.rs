#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Payment Service - Resilient Dependency Calls
//!
//! A payment microservice whose gateway, database and message-broker calls
//! all run through a shared resilience layer.
//!
//! # Layers (inside → outside)
//!
//! - **Resilience**: Circuit breakers, retry policies, timeout guards and
//!   the registry that shares them
//!   - `CircuitBreaker`: CLOSED / OPEN / HALF_OPEN failure gate
//!   - `RetryPolicy`: exponential backoff with jitter
//!   - `ResilienceManager`: named breakers and policies, profile wrappers
//!
//! - **Domain**: Payment types and rules
//!   - `payment`: Requests, payments, events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Gateway, repository and publisher interfaces
//!   - `services`: Charge, refund and lookup flows
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway`, `persistence`, `messaging`: in-process adapters
//!   - `config`: Configuration and dependency injection
//!   - `health`: Health check HTTP endpoint
//!
//! # Call Path
//!
//! ```text
//! caller ──► [rate limiter] ──► [bulkhead] ──► circuit breaker ──► retry ──► [timeout] ──► dependency
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Resilience layer - Breakers, retries and guards.
pub mod resilience;

/// Domain layer - Payment types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Resilience
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, Classify, ErrorKind,
    ResilienceError, ResilienceManager, ResilienceProfile, ResilientOperation, RetryConfig,
    RetryPolicy,
};

// Domain types
pub use domain::payment::{Payment, PaymentEvent, PaymentRequest, PaymentStatus};

// Services
pub use application::services::{PaymentService, PaymentServiceError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ServiceConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
