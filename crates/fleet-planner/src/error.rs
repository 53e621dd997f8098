//! Planner error types.

use thiserror::Error;

use fleet_core::WorkerId;

pub type PlanResult<T> = Result<T, PlanError>;

/// Why a plan or a peer entry was rejected. Plans are never clamped to
/// fit; the first violated constraint is reported as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error(
        "host too small: {threads} threads / {memory_gb}GB cannot hold the tracking worker and OS reservation"
    )]
    HostTooSmall { threads: u64, memory_gb: u64 },

    #[error("plan needs {requested} threads, host has {available}")]
    ThreadsExceeded { requested: u64, available: u64 },

    #[error("plan needs {requested}GB, host has {available}GB")]
    MemoryExceeded { requested: u64, available: u64 },

    #[error("worker {0} is listed more than once")]
    DuplicateWorker(WorkerId),

    #[error("worker id {0} is reserved for the tracking worker")]
    ReservedWorkerId(WorkerId),

    #[error("worker {0} has zero threads")]
    ZeroThreads(WorkerId),

    #[error("invalid peer address: {0:?}")]
    InvalidPeerAddress(String),
}
