//! Configuration Module
//!
//! Environment-driven configuration for the payment service and its
//! resilience profiles.

mod settings;

pub use settings::{
    ConfigError, GatewaySettings, ResilienceSettings, ServerSettings, ServiceConfig,
};
