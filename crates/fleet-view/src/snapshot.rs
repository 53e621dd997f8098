//! Fleet snapshot — everything the operator sees for one tick.
//!
//! Snapshots are rebuilt every tick and never stored. Unknown values stay
//! `None` here and render as `--`.

use std::fmt;

use serde::Serialize;

use fleet_core::{Height, Role, WorkerId};
use fleet_telemetry::{Advisory, WorkerMetrics};

use crate::status::WorkerStatus;

/// One worker's line in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerRow {
    pub id: WorkerId,
    pub role: Role,
    pub status: WorkerStatus,
    pub height: Option<Height>,
    pub lag: Option<u64>,
    pub peers: Option<u32>,
    /// Left at defaults for inactive workers.
    #[serde(flatten)]
    pub metrics: WorkerMetrics,
}

impl WorkerRow {
    pub fn inactive(id: WorkerId, role: Role) -> Self {
        Self {
            id,
            role,
            status: WorkerStatus::Inactive,
            height: None,
            lag: None,
            peers: None,
            metrics: WorkerMetrics::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSnapshot {
    /// Epoch seconds of the tick.
    pub taken_at: u64,
    /// Whether this tick backfilled every series.
    pub reconciled: bool,
    pub reference_height: Option<Height>,
    pub workers: Vec<WorkerRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<Advisory>,
}

impl FleetSnapshot {
    pub fn worker(&self, id: WorkerId) -> Option<&WorkerRow> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn count(&self, status: WorkerStatus) -> usize {
        self.workers.iter().filter(|w| w.status == status).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn or_dash<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "--".to_string())
}

fn secs(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}s")).unwrap_or_else(|| "--".to_string())
}

impl fmt::Display for FleetSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<6} {:<9} {:<9} {:>10} {:>5} {:>5} {:>9} {:>8} {:>7}",
            "WORKER", "ROLE", "STATUS", "HEIGHT", "LAG", "PEERS", "BLOCK_INT", "PROOF", "ATT/MIN"
        )?;
        for w in &self.workers {
            let rate = w
                .metrics
                .attempts_per_min
                .map(|r| format!("{r:.2}"))
                .unwrap_or_else(|| "--".to_string());
            writeln!(
                f,
                "{:<6} {:<9} {:<9} {:>10} {:>5} {:>5} {:>9} {:>8} {:>7}",
                w.id,
                w.role.label(),
                w.status.label(),
                or_dash(w.height),
                or_dash(w.lag),
                or_dash(w.peers),
                secs(w.metrics.avg_block_interval),
                secs(w.metrics.avg_proof_secs),
                rate,
            )?;
        }
        write!(
            f,
            "reference height {} | {} mining, {} syncing, {} sync-only, {} inactive",
            or_dash(self.reference_height),
            self.count(WorkerStatus::Mining),
            self.count(WorkerStatus::Syncing),
            self.count(WorkerStatus::SyncOnly),
            self.count(WorkerStatus::Inactive),
        )?;
        if let Some(advisory) = &self.advisory {
            write!(f, "\n{advisory}")?;
        }
        Ok(())
    }
}
