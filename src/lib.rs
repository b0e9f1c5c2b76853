// ABOUTME: convoy binary support: logging setup, attachment collection, the scenario catalog
// ABOUTME: The harness itself lives in convoy-core; the loopback service in convoy-sim

pub mod attachments;
pub mod logging;
pub mod scenarios;

// Re-export the harness for callers that only depend on this crate
pub use convoy_core::{config, runner, Config, ScenarioState};
