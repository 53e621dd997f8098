//! Worker status, derived from scratch every tick.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    /// Not running, or its log could not be read this tick.
    Inactive,
    /// Running without the mining flag.
    SyncOnly,
    /// Running, mining, and at the fleet reference height.
    Mining,
    /// Running and mining but behind the reference, or with no known height yet.
    Syncing,
}

impl WorkerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            WorkerStatus::Inactive => "inactive",
            WorkerStatus::SyncOnly => "sync-only",
            WorkerStatus::Mining => "mining",
            WorkerStatus::Syncing => "syncing",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `observed` is false when the worker is not running or its log was
/// unreadable; `lag` is `None` while either height is unknown.
pub fn derive_status(observed: bool, mining: bool, lag: Option<u64>) -> WorkerStatus {
    match (observed, mining, lag) {
        (false, _, _) => WorkerStatus::Inactive,
        (true, false, _) => WorkerStatus::SyncOnly,
        (true, true, Some(0)) => WorkerStatus::Mining,
        (true, true, _) => WorkerStatus::Syncing,
    }
}
