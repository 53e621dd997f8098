//! StateStore — redb-backed metric store.
//!
//! Append-only per-worker series with dedup on the row's key and a
//! retention window enforced inside the same write transaction as the
//! insert. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use fleet_core::WorkerId;

use crate::error::{StateError, StateResult};
use crate::tables::{ATTEMPTS, BLOCKS, PROOFS};
use crate::types::{Series, SeriesRow, worker_prefix, worker_prefix_end};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Keyed, deduplicating, retention-bounded storage for derived series.
///
/// Implementations must keep at most `retention` rows per worker per
/// series after every `append`, evicting from the low end of the natural
/// order, and must never store two rows with the same key.
pub trait SeriesStore: Clone + Send + Sync + 'static {
    /// Insert rows whose key is not yet present. Returns how many were new.
    fn append<R: SeriesRow>(&self, rows: &[R], retention: usize) -> StateResult<usize>;

    /// Up to `n` highest-ordered rows for a worker, in ascending order.
    fn recent<R: SeriesRow>(&self, worker_id: WorkerId, n: usize) -> StateResult<Vec<R>>;

    /// Latest event time among a worker's rows.
    fn newest_timestamp<R: SeriesRow>(&self, worker_id: WorkerId) -> StateResult<Option<u64>>;

    /// Number of rows stored for a worker.
    fn count<R: SeriesRow>(&self, worker_id: WorkerId) -> StateResult<usize>;
}

fn table_for(series: Series) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match series {
        Series::Blocks => BLOCKS,
        Series::Proofs => PROOFS,
        Series::Attempts => ATTEMPTS,
    }
}

/// Thread-safe metric store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "metric store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory metric store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(BLOCKS).map_err(map_err!(Table))?;
        txn.open_table(PROOFS).map_err(map_err!(Table))?;
        txn.open_table(ATTEMPTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// All rows for a worker, in natural order.
    pub fn list<R: SeriesRow>(&self, worker_id: WorkerId) -> StateResult<Vec<R>> {
        self.recent(worker_id, usize::MAX)
    }
}

impl SeriesStore for StateStore {
    fn append<R: SeriesRow>(&self, rows: &[R], retention: usize) -> StateResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table_def = table_for(R::SERIES);
        let mut inserted = 0;
        let mut evicted = 0;
        let workers: BTreeSet<WorkerId> = rows.iter().map(SeriesRow::worker_id).collect();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            for row in rows {
                let key = row.table_key();
                if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                    continue;
                }
                let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                inserted += 1;
            }

            // Trim each touched worker back to the retention window.
            for worker_id in workers {
                let lo = worker_prefix(worker_id);
                let hi = worker_prefix_end(worker_id);
                let keys: Vec<String> = table
                    .range(lo.as_str()..hi.as_str())
                    .map_err(map_err!(Read))?
                    .map(|entry| entry.map(|(k, _)| k.value().to_string()))
                    .collect::<Result<_, _>>()
                    .map_err(map_err!(Read))?;
                let excess = keys.len().saturating_sub(retention);
                for key in keys.iter().take(excess) {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                }
                evicted += excess;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(series = R::SERIES.label(), inserted, evicted, "rows appended");
        Ok(inserted)
    }

    fn recent<R: SeriesRow>(&self, worker_id: WorkerId, n: usize) -> StateResult<Vec<R>> {
        let lo = worker_prefix(worker_id);
        let hi = worker_prefix_end(worker_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(R::SERIES)).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(n)
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: R = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(row);
        }
        results.reverse();
        Ok(results)
    }

    fn newest_timestamp<R: SeriesRow>(&self, worker_id: WorkerId) -> StateResult<Option<u64>> {
        // Block rows are ordered by height, not time, so scan the window.
        let rows: Vec<R> = self.list(worker_id)?;
        Ok(rows.iter().map(SeriesRow::timestamp).max())
    }

    fn count<R: SeriesRow>(&self, worker_id: WorkerId) -> StateResult<usize> {
        let lo = worker_prefix(worker_id);
        let hi = worker_prefix_end(worker_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(R::SERIES)).map_err(map_err!(Table))?;
        let count = table.range(lo.as_str()..hi.as_str()).map_err(map_err!(Read))?.count();
        Ok(count)
    }
}
