//! Row types for the metric store.
//!
//! Rows are derived from worker logs and are re-derivable at any time;
//! the store only caches them. Each row type names its dedup key through
//! [`SeriesRow::sort_key`], which also fixes the series' natural order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use fleet_core::{Height, WorkerId};

/// The derived series kept per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Blocks,
    Proofs,
    Attempts,
}

impl Series {
    pub fn label(&self) -> &'static str {
        match self {
            Series::Blocks => "blocks",
            Series::Proofs => "proofs",
            Series::Attempts => "attempts",
        }
    }
}

/// A row that can live in one of the per-worker series tables.
pub trait SeriesRow: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const SERIES: Series;

    fn worker_id(&self) -> WorkerId;

    /// Zero-padded key encoding the dedup tuple in natural sort order.
    fn sort_key(&self) -> String;

    /// Anchored event time in unix seconds.
    fn timestamp(&self) -> u64;

    /// Full table key: worker prefix plus sort key.
    fn table_key(&self) -> String {
        format!("{}{}", worker_prefix(self.worker_id()), self.sort_key())
    }
}

/// Key prefix shared by all of a worker's rows.
pub fn worker_prefix(worker_id: WorkerId) -> String {
    format!("{worker_id:010}:")
}

/// Exclusive upper bound of a worker's key range (`;` sorts after `:`).
pub fn worker_prefix_end(worker_id: WorkerId) -> String {
    format!("{worker_id:010};")
}

// ── Blocks ─────────────────────────────────────────────────────────

/// A block the worker added to its validated set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub worker_id: WorkerId,
    pub height: Height,
    /// Unix seconds of the validation line.
    pub at: u64,
}

impl SeriesRow for BlockRow {
    const SERIES: Series = Series::Blocks;

    fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    fn sort_key(&self) -> String {
        format!("{:020}:{:020}", self.height.get(), self.at)
    }

    fn timestamp(&self) -> u64 {
        self.at
    }
}

// ── Proofs ─────────────────────────────────────────────────────────

/// A finished proof, with its start when one could be correlated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRow {
    pub worker_id: WorkerId,
    pub height: Height,
    pub finished_at: u64,
    pub started_at: Option<u64>,
}

impl ProofRow {
    /// Seconds from start to finish, unknown if uncorrelated or inverted.
    pub fn duration_secs(&self) -> Option<u64> {
        self.started_at
            .and_then(|start| self.finished_at.checked_sub(start))
    }
}

impl SeriesRow for ProofRow {
    const SERIES: Series = Series::Proofs;

    fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    fn sort_key(&self) -> String {
        format!("{:020}:{:020}", self.finished_at, self.height.get())
    }

    fn timestamp(&self) -> u64 {
        self.finished_at
    }
}

// ── Attempts ───────────────────────────────────────────────────────

/// A proving attempt the worker started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRow {
    pub worker_id: WorkerId,
    pub at: u64,
}

impl SeriesRow for AttemptRow {
    const SERIES: Series = Series::Attempts;

    fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    fn sort_key(&self) -> String {
        format!("{:020}", self.at)
    }

    fn timestamp(&self) -> u64 {
        self.at
    }
}
