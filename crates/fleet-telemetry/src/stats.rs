//! Rolling aggregates over a worker's stored series.

use serde::Serialize;

use fleet_core::{Height, WorkerId};
use fleet_state::{AttemptRow, BlockRow, ProofRow, SeriesRow, SeriesStore, StateResult};

/// Mean of the positive gaps between consecutive timestamps, taken in
/// the order the rows are stored.
///
/// Zero gaps (repeated stamps) and the inverted gaps a misordered log
/// produces are skipped. Unknown when fewer than two stamps or no
/// positive gap exist.
pub fn mean_positive_interval(timestamps: &[u64]) -> Option<f64> {
    let gaps: Vec<u64> = timestamps
        .windows(2)
        .filter_map(|w| w[1].checked_sub(w[0]))
        .filter(|&d| d > 0)
        .collect();
    if gaps.is_empty() {
        return None;
    }
    Some(gaps.iter().sum::<u64>() as f64 / gaps.len() as f64)
}

/// Derived per-worker figures shown in the fleet snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerMetrics {
    /// Mean seconds between validated blocks.
    pub avg_block_interval: Option<f64>,
    /// Mean duration of proofs whose start is known.
    pub avg_proof_secs: Option<f64>,
    pub attempts_per_min: Option<f64>,
    pub last_block: Option<Height>,
    pub last_block_at: Option<u64>,
    pub proofs: usize,
}

impl WorkerMetrics {
    pub fn read<S: SeriesStore>(store: &S, worker_id: WorkerId, window: usize) -> StateResult<Self> {
        let blocks: Vec<BlockRow> = store.recent(worker_id, window)?;
        let proofs: Vec<ProofRow> = store.recent(worker_id, window)?;
        let attempts: Vec<AttemptRow> = store.recent(worker_id, window)?;
        Ok(Self::from_rows(&blocks, &proofs, &attempts))
    }

    pub fn from_rows(blocks: &[BlockRow], proofs: &[ProofRow], attempts: &[AttemptRow]) -> Self {
        let block_times: Vec<u64> = blocks.iter().map(SeriesRow::timestamp).collect();
        let attempt_times: Vec<u64> = attempts.iter().map(SeriesRow::timestamp).collect();

        let durations: Vec<u64> = proofs.iter().filter_map(ProofRow::duration_secs).collect();
        let avg_proof_secs = (!durations.is_empty())
            .then(|| durations.iter().sum::<u64>() as f64 / durations.len() as f64);

        // Block rows sort by height, so the last row is the highest block.
        let last = blocks.last();

        Self {
            avg_block_interval: mean_positive_interval(&block_times),
            avg_proof_secs,
            attempts_per_min: mean_positive_interval(&attempt_times).map(|secs| 60.0 / secs),
            last_block: last.map(|b| b.height),
            last_block_at: last.map(|b| b.at),
            proofs: proofs.len(),
        }
    }
}
