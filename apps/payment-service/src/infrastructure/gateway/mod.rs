//! Payment Gateway Adapters
//!
//! - `SimulatedGateway`: in-process gateway with a configurable approval rate,
//!   latency and an outage switch

mod simulated;

pub use simulated::{SIMULATED_GATEWAY_NAME, SimulatedGateway};
