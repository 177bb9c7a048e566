//! Preset resilience profiles per class of dependency.
//!
//! | Profile | failure_threshold | recovery_timeout | max_attempts | base_delay | max_delay | exponential_base |
//! |---|---|---|---|---|---|---|
//! | database | 3 | 30s | 3 | 0.5s | 10s | 2.0 |
//! | external_api | 5 | 60s | 3 | 1.0s | 30s | 2.0 |
//! | message_queue | 3 | 30s | 5 | 0.5s | 15s | 1.5 |
//! | payment_gateway | 3 | 120s | 2 | 2.0s | 10s | 2.0 |
//!
//! Payment gateway calls get the longest recovery window and the fewest
//! retries so a paid external service is not hammered and duplicate charges
//! stay unlikely. Broker calls get the most retries since transient connection
//! drops are common and cheap to retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::circuit_breaker::CircuitBreakerConfig;
use super::retry::RetryConfig;

/// Class of dependency a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResilienceProfile {
    /// Relational or document store.
    Database,
    /// Generic third-party HTTP API.
    ExternalApi,
    /// Message broker producer or consumer.
    MessageQueue,
    /// Payment gateway API.
    PaymentGateway,
}

impl ResilienceProfile {
    /// Every profile.
    pub const ALL: [Self; 4] = [
        Self::Database,
        Self::ExternalApi,
        Self::MessageQueue,
        Self::PaymentGateway,
    ];

    /// Profile name, also the operation-name prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::ExternalApi => "external_api",
            Self::MessageQueue => "message_queue",
            Self::PaymentGateway => "payment_gateway",
        }
    }

    /// Registry key for `name` under this profile, e.g. `database_get_payment`.
    #[must_use]
    pub fn operation_name(self, name: &str) -> String {
        format!("{}_{name}", self.as_str())
    }

    /// Built-in settings for this profile.
    #[must_use]
    pub const fn defaults(self) -> ProfileSettings {
        let (failure_threshold, recovery_secs, max_attempts, base_ms, max_secs, exponential_base) =
            match self {
                Self::Database => (3, 30, 3, 500, 10, 2.0),
                Self::ExternalApi => (5, 60, 3, 1_000, 30, 2.0),
                Self::MessageQueue => (3, 30, 5, 500, 15, 1.5),
                Self::PaymentGateway => (3, 120, 2, 2_000, 10, 2.0),
            };

        ProfileSettings {
            circuit_breaker: CircuitBreakerConfig::new(
                failure_threshold,
                Duration::from_secs(recovery_secs),
            ),
            retry: RetryConfig::new(
                max_attempts,
                Duration::from_millis(base_ms),
                Duration::from_secs(max_secs),
                exponential_base,
            ),
            timeout: None,
        }
    }
}

impl std::fmt::Display for ResilienceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker and retry settings applied by a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSettings {
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Per-attempt time bound, if any.
    pub timeout: Option<Duration>,
}
