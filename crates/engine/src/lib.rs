//! Fleet operations engine.
//!
//! Fans one management action out across many remote endpoints with bounded
//! concurrency, per-target retry and timeouts, and deterministic aggregation.
//! The CLI crate drives it; the Redfish adapter is the stock endpoint client.

pub mod aggregate;
pub mod config;
pub mod confirm;
pub mod dispatch;
pub mod endpoint;
pub mod monitor;
pub mod redfish;
pub mod registry;
pub mod retry;
pub mod sink;
pub mod telemetry;

#[cfg(test)]
pub mod test_support;
