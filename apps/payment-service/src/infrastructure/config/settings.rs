//! Payment Service Configuration Settings
//!
//! Configuration types for the payment service, loaded from environment
//! variables. Unset or unparsable values fall back to defaults; the loaded
//! configuration is then validated as a whole.

use std::time::Duration;

use crate::resilience::{ProfileSettings, ResilienceProfile};

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
    /// Whether the Prometheus recorder is installed.
    pub metrics_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            health_port: 8085,
            metrics_enabled: true,
        }
    }
}

/// Simulated payment gateway settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    /// Probability in [0, 1] that a charge is approved.
    pub success_rate: f64,
    /// Simulated processing latency per gateway call.
    pub processing_time: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            success_rate: 0.85,
            processing_time: Duration::from_millis(2000),
        }
    }
}

/// Per-profile resilience settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceSettings {
    /// Database calls.
    pub database: ProfileSettings,
    /// Generic external API calls.
    pub external_api: ProfileSettings,
    /// Message broker calls.
    pub message_queue: ProfileSettings,
    /// Payment gateway calls.
    pub payment_gateway: ProfileSettings,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            database: ResilienceProfile::Database.defaults(),
            external_api: ResilienceProfile::ExternalApi.defaults(),
            message_queue: ResilienceProfile::MessageQueue.defaults(),
            payment_gateway: ResilienceProfile::PaymentGateway.defaults(),
        }
    }
}

impl ResilienceSettings {
    /// Settings for `profile`.
    #[must_use]
    pub const fn get(&self, profile: ResilienceProfile) -> &ProfileSettings {
        match profile {
            ResilienceProfile::Database => &self.database,
            ResilienceProfile::ExternalApi => &self.external_api,
            ResilienceProfile::MessageQueue => &self.message_queue,
            ResilienceProfile::PaymentGateway => &self.payment_gateway,
        }
    }

    /// Pairs suitable for `ResilienceManager::with_profiles`.
    #[must_use]
    pub fn into_profiles(self) -> [(ResilienceProfile, ProfileSettings); 4] {
        [
            (ResilienceProfile::Database, self.database),
            (ResilienceProfile::ExternalApi, self.external_api),
            (ResilienceProfile::MessageQueue, self.message_queue),
            (ResilienceProfile::PaymentGateway, self.payment_gateway),
        ]
    }

    fn get_mut(&mut self, profile: ResilienceProfile) -> &mut ProfileSettings {
        match profile {
            ResilienceProfile::Database => &mut self.database,
            ResilienceProfile::ExternalApi => &mut self.external_api,
            ResilienceProfile::MessageQueue => &mut self.message_queue,
            ResilienceProfile::PaymentGateway => &mut self.payment_gateway,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Service name used in logs and health responses.
    pub service_name: String,
    /// Server settings.
    pub server: ServerSettings,
    /// Simulated gateway settings.
    pub gateway: GatewaySettings,
    /// Resilience profile settings.
    pub resilience: ResilienceSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "payment-service".to_string(),
            server: ServerSettings::default(),
            gateway: GatewaySettings::default(),
            resilience: ResilienceSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let service_name = lookup("SERVICE_NAME").unwrap_or(defaults.service_name);
        if service_name.trim().is_empty() {
            return Err(ConfigError::EmptyValue("SERVICE_NAME".to_string()));
        }

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "PAYMENT_SERVICE_HEALTH_PORT",
                defaults.server.health_port,
            ),
            metrics_enabled: parse_or(
                &lookup,
                "PAYMENT_SERVICE_METRICS_ENABLED",
                defaults.server.metrics_enabled,
            ),
        };

        let gateway = GatewaySettings {
            success_rate: parse_or(&lookup, "PAYMENT_SUCCESS_RATE", defaults.gateway.success_rate),
            processing_time: parse_duration_millis(
                &lookup,
                "PAYMENT_PROCESSING_TIME_MS",
                defaults.gateway.processing_time,
            ),
        };

        let mut resilience = defaults.resilience;
        for profile in ResilienceProfile::ALL {
            apply_profile_overrides(&lookup, profile, resilience.get_mut(profile));
        }

        let config = Self {
            service_name,
            server,
            gateway,
            resilience,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.gateway.success_rate) {
            return Err(ConfigError::Invalid {
                key: "PAYMENT_SUCCESS_RATE".to_string(),
                reason: format!("must be within [0, 1], got {}", self.gateway.success_rate),
            });
        }

        for profile in ResilienceProfile::ALL {
            let settings = self.resilience.get(profile);
            if settings.circuit_breaker.failure_threshold == 0 {
                return Err(ConfigError::Invalid {
                    key: profile_key(profile, "FAILURE_THRESHOLD"),
                    reason: "must be at least 1".to_string(),
                });
            }
            if settings.retry.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: profile_key(profile, "MAX_ATTEMPTS"),
                    reason: "must be at least 1".to_string(),
                });
            }
            if settings.retry.base_delay > settings.retry.max_delay {
                return Err(ConfigError::Invalid {
                    key: profile_key(profile, "BASE_DELAY_MS"),
                    reason: format!(
                        "base delay {}ms exceeds max delay {}ms",
                        settings.retry.base_delay.as_millis(),
                        settings.retry.max_delay.as_millis()
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A value is outside its allowed range.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Offending environment variable.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn profile_key(profile: ResilienceProfile, suffix: &str) -> String {
    format!(
        "RESILIENCE_{}_{suffix}",
        profile.as_str().to_ascii_uppercase()
    )
}

fn apply_profile_overrides<L>(lookup: &L, profile: ResilienceProfile, settings: &mut ProfileSettings)
where
    L: Fn(&str) -> Option<String>,
{
    let breaker = &mut settings.circuit_breaker;
    breaker.failure_threshold = parse_or(
        lookup,
        &profile_key(profile, "FAILURE_THRESHOLD"),
        breaker.failure_threshold,
    );
    breaker.recovery_timeout = parse_duration_secs(
        lookup,
        &profile_key(profile, "RECOVERY_TIMEOUT_SECS"),
        breaker.recovery_timeout,
    );

    let retry = &mut settings.retry;
    retry.max_attempts = parse_or(lookup, &profile_key(profile, "MAX_ATTEMPTS"), retry.max_attempts);
    retry.base_delay = parse_duration_millis(
        lookup,
        &profile_key(profile, "BASE_DELAY_MS"),
        retry.base_delay,
    );
    retry.max_delay = parse_duration_millis(
        lookup,
        &profile_key(profile, "MAX_DELAY_MS"),
        retry.max_delay,
    );
}

fn parse_or<L, T>(lookup: &L, key: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<L>(lookup: &L, key: &str, default: Duration) -> Duration
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<L>(lookup: &L, key: &str, default: Duration) -> Duration
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
