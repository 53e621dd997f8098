//! fleet-core — shared types and configuration for minerfleet.
//!
//! Everything downstream (store, telemetry, planner, view, daemon) is
//! parameterised by one immutable [`FleetConfig`] loaded at startup.

pub mod config;
pub mod types;

pub use config::{ConfigError, FleetConfig};
pub use types::*;
