//! Prometheus text exposition of a fleet snapshot.
//!
//! Unknown values are omitted rather than written as zero, so a scraper
//! sees a gap instead of a false reading.

use std::fmt::Write;

use crate::snapshot::FleetSnapshot;
use crate::status::WorkerStatus;

const STATUSES: [WorkerStatus; 4] = [
    WorkerStatus::Inactive,
    WorkerStatus::SyncOnly,
    WorkerStatus::Mining,
    WorkerStatus::Syncing,
];

fn header(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
}

/// Render one snapshot as gauges labelled by `worker`.
pub fn render_prometheus(snapshot: &FleetSnapshot) -> String {
    let mut out = String::new();

    header(&mut out, "minerfleet_reference_height", "Highest chain height seen by any worker.");
    if let Some(h) = snapshot.reference_height {
        let _ = writeln!(out, "minerfleet_reference_height {h}");
    }

    header(&mut out, "minerfleet_worker_status", "1 for the worker's current status, 0 otherwise.");
    for w in &snapshot.workers {
        for status in STATUSES {
            let _ = writeln!(
                out,
                "minerfleet_worker_status{{worker=\"{}\",status=\"{}\"}} {}",
                w.id,
                status.label(),
                u8::from(w.status == status)
            );
        }
    }

    header(&mut out, "minerfleet_worker_height", "Worker chain height.");
    for w in &snapshot.workers {
        if let Some(h) = w.height {
            let _ = writeln!(out, "minerfleet_worker_height{{worker=\"{}\"}} {h}", w.id);
        }
    }

    header(&mut out, "minerfleet_worker_lag_blocks", "Blocks behind the reference height.");
    for w in &snapshot.workers {
        if let Some(lag) = w.lag {
            let _ = writeln!(out, "minerfleet_worker_lag_blocks{{worker=\"{}\"}} {lag}", w.id);
        }
    }

    header(&mut out, "minerfleet_worker_peers", "Latest connected peer count.");
    for w in &snapshot.workers {
        if let Some(peers) = w.peers {
            let _ = writeln!(out, "minerfleet_worker_peers{{worker=\"{}\"}} {peers}", w.id);
        }
    }

    header(&mut out, "minerfleet_block_interval_seconds", "Mean seconds between validated blocks.");
    for w in &snapshot.workers {
        if let Some(v) = w.metrics.avg_block_interval {
            let _ = writeln!(out, "minerfleet_block_interval_seconds{{worker=\"{}\"}} {v:.2}", w.id);
        }
    }

    header(&mut out, "minerfleet_proof_duration_seconds", "Mean proof duration.");
    for w in &snapshot.workers {
        if let Some(v) = w.metrics.avg_proof_secs {
            let _ = writeln!(out, "minerfleet_proof_duration_seconds{{worker=\"{}\"}} {v:.2}", w.id);
        }
    }

    header(&mut out, "minerfleet_proof_attempts_per_minute", "Proof attempts started per minute.");
    for w in &snapshot.workers {
        if let Some(v) = w.metrics.attempts_per_min {
            let _ = writeln!(out, "minerfleet_proof_attempts_per_minute{{worker=\"{}\"}} {v:.4}", w.id);
        }
    }

    out
}
