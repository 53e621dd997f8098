//! fleet-planner — partitions a host into mining workers.
//!
//! This crate decides how many workers run and with what resources. It
//! does not start them: it renders argument vectors and unit files that
//! a process supervisor executes.
//!
//! # Components
//!
//! - **`planner`** — recommended and custom plans, host feasibility
//! - **`topology`** — peer lists and address validation
//! - **`launch`** — plan → worker command line
//! - **`units`** — command line → systemd unit file

pub mod error;
pub mod launch;
pub mod planner;
pub mod topology;
pub mod units;

pub use error::{PlanError, PlanResult};
pub use launch::LaunchSpec;
pub use planner::{CustomEntry, CustomPlan, OS_RESERVED_GB, Plan, PlannedWorker, plan};
pub use topology::{PeerAddress, topology, topology_from_config, worker_port};
pub use units::{UnitDefinition, render_unit, unit_name, write_units};
