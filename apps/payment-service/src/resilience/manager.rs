//! Registry of circuit breakers and retry policies.
//!
//! One [`ResilienceManager`] is created at process start and shared as
//! `Arc<ResilienceManager>` with every service that makes dependency calls.
//! It holds at most one breaker and one retry policy per operation name.
//!
//! Get-or-create is first-writer-wins: a later lookup with different
//! settings gets the instance registered first. Call sites use fixed
//! settings per name, so this never surprises in practice.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState,
};
use super::error::Classify;
use super::operation::ResilientOperation;
use super::profile::{ProfileSettings, ResilienceProfile};
use super::retry::{RetryConfig, RetryPolicy, RetryPolicyMetrics};

/// Process-wide resilience registry.
#[derive(Debug)]
pub struct ResilienceManager {
    circuit_breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    retry_policies: RwLock<HashMap<String, Arc<RetryPolicy>>>,
    profiles: HashMap<ResilienceProfile, ProfileSettings>,
}

impl Default for ResilienceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceManager {
    /// Create a manager using the built-in profile settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_profiles(std::iter::empty())
    }

    /// Create a manager, replacing the built-in settings of the given profiles.
    #[must_use]
    pub fn with_profiles(
        overrides: impl IntoIterator<Item = (ResilienceProfile, ProfileSettings)>,
    ) -> Self {
        let mut profiles: HashMap<_, _> = ResilienceProfile::ALL
            .into_iter()
            .map(|profile| (profile, profile.defaults()))
            .collect();
        profiles.extend(overrides);

        Self {
            circuit_breakers: RwLock::new(HashMap::new()),
            retry_policies: RwLock::new(HashMap::new()),
            profiles,
        }
    }

    /// Settings in effect for `profile`.
    #[must_use]
    pub fn profile_settings(&self, profile: ResilienceProfile) -> ProfileSettings {
        self.profiles
            .get(&profile)
            .cloned()
            .unwrap_or_else(|| profile.defaults())
    }

    /// Get the breaker for `name`, creating it with `config` if absent.
    #[must_use]
    pub fn get_circuit_breaker(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.read().get(name) {
            return Arc::clone(existing);
        }

        let mut breakers = self.circuit_breakers.write();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config))),
        )
    }

    /// Get the retry policy for `name`, creating it with `config` if absent.
    #[must_use]
    pub fn get_retry_policy(&self, name: &str, config: RetryConfig) -> Arc<RetryPolicy> {
        if let Some(existing) = self.retry_policies.read().get(name) {
            return Arc::clone(existing);
        }

        let mut policies = self.retry_policies.write();
        Arc::clone(
            policies
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RetryPolicy::new(name, config))),
        )
    }

    /// Look up a registered breaker without creating one.
    #[must_use]
    pub fn circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuit_breakers.read().get(name).cloned()
    }

    /// Look up a registered retry policy without creating one.
    #[must_use]
    pub fn retry_policy(&self, name: &str) -> Option<Arc<RetryPolicy>> {
        self.retry_policies.read().get(name).cloned()
    }

    /// Build the composed wrapper for `name` under `profile`.
    ///
    /// The breaker and policy are registered as `"<profile>_<name>"`.
    pub fn operation(&self, profile: ResilienceProfile, name: &str) -> ResilientOperation {
        let full_name = profile.operation_name(name);
        let settings = self.profile_settings(profile);
        let circuit_breaker = self.get_circuit_breaker(&full_name, settings.circuit_breaker);
        let retry_policy = self.get_retry_policy(&full_name, settings.retry);

        ResilientOperation::new(full_name, circuit_breaker, retry_policy, settings.timeout)
    }

    /// Wrapper for a database call.
    pub fn database(&self, name: &str) -> ResilientOperation {
        self.operation(ResilienceProfile::Database, name)
    }

    /// Wrapper for a generic external API call.
    pub fn external_api(&self, name: &str) -> ResilientOperation {
        self.operation(ResilienceProfile::ExternalApi, name)
    }

    /// Wrapper for a message broker call.
    pub fn message_queue(&self, name: &str) -> ResilientOperation {
        self.operation(ResilienceProfile::MessageQueue, name)
    }

    /// Wrapper for a payment gateway call.
    pub fn payment_gateway(&self, name: &str) -> ResilientOperation {
        self.operation(ResilienceProfile::PaymentGateway, name)
    }

    /// Run `operation` ungated and feed its outcome into the breaker for `name`.
    ///
    /// The breaker is created with default settings if absent. Errors outside
    /// the breaker's failure policy are not counted.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error.
    pub async fn observe<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let breaker = self.get_circuit_breaker(name, CircuitBreakerConfig::default());
        let result = operation().await;

        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) if breaker.config().failure_policy.matches(e.kind()) => {
                breaker.record_failure();
            }
            Err(_) => {}
        }

        result
    }

    /// Force every registered breaker CLOSED.
    pub fn reset_all(&self) {
        let breakers: Vec<_> = self.circuit_breakers.read().values().cloned().collect();
        for breaker in &breakers {
            breaker.reset();
        }
        tracing::info!(count = breakers.len(), "All circuit breakers reset");
    }

    /// Snapshot of every registered breaker and retry policy.
    #[must_use]
    pub fn get_metrics(&self) -> ResilienceMetrics {
        let circuit_breakers = self
            .circuit_breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.metrics()))
            .collect();
        let retry_policies = self
            .retry_policies
            .read()
            .iter()
            .map(|(name, policy)| (name.clone(), policy.metrics()))
            .collect();

        ResilienceMetrics {
            circuit_breakers,
            retry_policies,
        }
    }
}

/// Combined resilience snapshot, keyed by operation name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceMetrics {
    /// Breaker snapshots.
    pub circuit_breakers: BTreeMap<String, CircuitBreakerMetrics>,
    /// Retry policy snapshots.
    pub retry_policies: BTreeMap<String, RetryPolicyMetrics>,
}

impl ResilienceMetrics {
    /// Whether every breaker is CLOSED.
    #[must_use]
    pub fn all_closed(&self) -> bool {
        self.circuit_breakers
            .values()
            .all(|m| m.state == CircuitBreakerState::Closed)
    }

    /// Names of breakers OPEN and still rejecting calls.
    ///
    /// An OPEN breaker whose recovery timeout has elapsed is left out; the next
    /// call would be admitted as its trial.
    pub fn open_circuits(&self) -> impl Iterator<Item = &str> {
        self.circuit_breakers
            .values()
            .filter(|m| m.state == CircuitBreakerState::Open && !m.accepting_calls)
            .map(|m| m.name.as_str())
    }
}
