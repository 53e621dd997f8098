//! fleet-view — the live fleet snapshot.
//!
//! Drives the per-tick refresh of every worker, derives status from the
//! current truth (process probe, log tail, fleet reference height), and
//! renders the result as a table, JSON or Prometheus text.
//!
//! # Components
//!
//! - **`ticker`** — `FleetView`: parallel per-worker updates, join, aggregate
//! - **`status`** — the four worker states
//! - **`probe`** — is a worker process running
//! - **`snapshot`** / **`prometheus`** — output surfaces

pub mod probe;
pub mod prometheus;
pub mod snapshot;
pub mod status;
pub mod ticker;

pub use probe::{AssumeRunning, ProcessProbe, SystemdProbe};
pub use prometheus::render_prometheus;
pub use snapshot::{FleetSnapshot, WorkerRow};
pub use status::{WorkerStatus, derive_status};
pub use ticker::{FleetView, Intervals, WatchedWorker};
