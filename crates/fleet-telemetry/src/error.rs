//! Telemetry error types.
//!
//! Only conditions a caller can act on are errors. A line that matches no
//! pattern is simply `None`, and a proof whose start cannot be recovered
//! is stored with an unknown duration.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("log source unavailable: {path:?}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("worker {worker} update exceeded {timeout_ms}ms")]
    Timeout { worker: fleet_core::WorkerId, timeout_ms: u64 },

    #[error("metric store error: {0}")]
    State(#[from] fleet_state::StateError),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
