//! Ingest — turns a worker's log tail into stored series rows.
//!
//! Each series picks its own mode per update. A series that is empty,
//! stale, or being reconciled is backfilled from the bounded tail; any
//! other series only looks at its newest matching line. Appends are
//! idempotent, so re-running an update over an unchanged tail stores
//! nothing new.

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::debug;

use fleet_core::config::TelemetryConfig;
use fleet_core::{Height, WorkerId};
use fleet_state::{AttemptRow, BlockRow, ProofRow, SeriesRow, SeriesStore};

use crate::aggregate::worker_height;
use crate::clock::{anchor, epoch_secs};
use crate::correlate::{start_in_tail, start_in_window};
use crate::error::TelemetryResult;
use crate::extract::{Event, EventKind, extract, locate_height};
use crate::source::{LogLine, LogSource};

/// Knobs for one ingest pass, lifted out of the telemetry config.
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub retention: usize,
    pub bulk_line_limit: usize,
    pub tail_bytes: u64,
    pub window_radius: u64,
    pub staleness_secs: u64,
}

impl From<&TelemetryConfig> for IngestSettings {
    fn from(cfg: &TelemetryConfig) -> Self {
        Self {
            retention: cfg.retention,
            bulk_line_limit: cfg.bulk_line_limit,
            tail_bytes: cfg.tail_bytes,
            window_radius: cfg.window_radius,
            staleness_secs: cfg.staleness_secs,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&TelemetryConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    Bulk,
    Incremental,
}

impl IngestMode {
    pub fn label(&self) -> &'static str {
        match self {
            IngestMode::Bulk => "bulk",
            IngestMode::Incremental => "incremental",
        }
    }
}

/// Outcome for one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesUpdate {
    pub mode: IngestMode,
    pub inserted: usize,
}

/// Outcome of one worker update: what was stored plus what the tail
/// says right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerUpdate {
    pub worker_id: WorkerId,
    pub height: Option<Height>,
    pub peers: Option<u32>,
    pub blocks: SeriesUpdate,
    pub proofs: SeriesUpdate,
    pub attempts: SeriesUpdate,
}

/// Writes derived rows for any number of workers into one store.
#[derive(Clone)]
pub struct Ingestor<S: SeriesStore> {
    store: S,
    settings: IngestSettings,
}

impl<S: SeriesStore> Ingestor<S> {
    pub fn new(store: S, settings: IngestSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Read the worker's tail once and bring all three series up to date.
    ///
    /// The tail's time-of-day stamps are anchored against the source's
    /// last write, or `now` when the source cannot tell. `now` alone
    /// decides staleness. `force_bulk` backfills every series regardless
    /// of its state.
    pub fn update(
        &self,
        worker_id: WorkerId,
        source: &dyn LogSource,
        now: NaiveDateTime,
        force_bulk: bool,
    ) -> TelemetryResult<WorkerUpdate> {
        let lines = source.tail(self.settings.tail_bytes)?;
        let now_secs = epoch_secs(now);
        let clock = source.last_write().unwrap_or(now);

        let blocks = self.ingest_series(
            worker_id,
            &lines,
            EventKind::BlockValidated,
            now_secs,
            force_bulk,
            |_, event| match event {
                Event::BlockValidated { height, time } => Some(BlockRow {
                    worker_id,
                    height,
                    at: anchor(clock, time),
                }),
                _ => None,
            },
        )?;

        let proofs = self.ingest_series(
            worker_id,
            &lines,
            EventKind::ProofFinished,
            now_secs,
            force_bulk,
            |idx, event| match event {
                Event::ProofFinished { height, time } => {
                    let started = self.proof_start(worker_id, source, &lines, idx, height);
                    Some(ProofRow {
                        worker_id,
                        height,
                        finished_at: anchor(clock, time),
                        started_at: started.map(|t| anchor(clock, t)),
                    })
                }
                _ => None,
            },
        )?;

        let attempts = self.ingest_series(
            worker_id,
            &lines,
            EventKind::ProofAttemptStarted,
            now_secs,
            force_bulk,
            |_, event| match event {
                Event::ProofAttemptStarted { time } => Some(AttemptRow {
                    worker_id,
                    at: anchor(clock, time),
                }),
                _ => None,
            },
        )?;

        Ok(WorkerUpdate {
            worker_id,
            height: worker_height(&lines),
            peers: latest_peer_count(&lines),
            blocks,
            proofs,
            attempts,
        })
    }

    /// Up to `n` newest rows of a series, oldest first.
    pub fn read_recent<R: SeriesRow>(&self, worker_id: WorkerId, n: usize) -> TelemetryResult<Vec<R>> {
        Ok(self.store.recent(worker_id, n)?)
    }

    fn mode_for<R: SeriesRow>(
        &self,
        worker_id: WorkerId,
        now_secs: u64,
        force_bulk: bool,
    ) -> TelemetryResult<IngestMode> {
        if force_bulk {
            return Ok(IngestMode::Bulk);
        }
        let mode = match self.store.newest_timestamp::<R>(worker_id)? {
            None => IngestMode::Bulk,
            Some(newest) if now_secs.saturating_sub(newest) > self.settings.staleness_secs => {
                IngestMode::Bulk
            }
            Some(_) => IngestMode::Incremental,
        };
        Ok(mode)
    }

    fn ingest_series<R, F>(
        &self,
        worker_id: WorkerId,
        lines: &[LogLine],
        kind: EventKind,
        now_secs: u64,
        force_bulk: bool,
        mut build: F,
    ) -> TelemetryResult<SeriesUpdate>
    where
        R: SeriesRow,
        F: FnMut(usize, Event) -> Option<R>,
    {
        let mode = self.mode_for::<R>(worker_id, now_secs, force_bulk)?;
        let events = self.candidates(lines, kind, mode);
        let rows: Vec<R> = events
            .into_iter()
            .filter_map(|(idx, event)| build(idx, event))
            .collect();
        let inserted = self.store.append(&rows, self.settings.retention)?;
        debug!(
            worker = worker_id,
            series = R::SERIES.label(),
            mode = mode.label(),
            candidates = rows.len(),
            inserted,
            "series updated"
        );
        Ok(SeriesUpdate { mode, inserted })
    }

    /// Valid events of `kind` with their line index, oldest first.
    fn candidates(&self, lines: &[LogLine], kind: EventKind, mode: IngestMode) -> Vec<(usize, Event)> {
        let limit = match mode {
            IngestMode::Bulk => self.settings.bulk_line_limit,
            IngestMode::Incremental => 1,
        };
        let mut picked: Vec<usize> = lines
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, l)| kind.may_match(&l.text))
            .take(limit)
            .map(|(idx, _)| idx)
            .collect();
        picked.reverse();

        let mut events: Vec<(usize, Event)> = picked
            .into_iter()
            .filter_map(|idx| {
                extract(&lines[idx].text)
                    .filter(|e| e.kind() == kind)
                    .map(|e| (idx, e))
            })
            .collect();
        let excess = events.len().saturating_sub(self.settings.retention);
        events.drain(..excess);
        events
    }

    fn proof_start(
        &self,
        worker_id: WorkerId,
        source: &dyn LogSource,
        lines: &[LogLine],
        idx: usize,
        height: Height,
    ) -> Option<NaiveTime> {
        if let Some(start) = start_in_tail(lines, idx, height) {
            return Some(start);
        }
        let line = &lines[idx];
        let token = locate_height(&line.text, height).unwrap_or(0) as u64;
        let found = match source.window(line.offset + token, self.settings.window_radius) {
            Ok((text, center)) => start_in_window(&text, center, height),
            Err(e) => {
                debug!(worker = worker_id, %height, error = %e, "correlation window unreadable");
                None
            }
        };
        if found.is_none() {
            debug!(worker = worker_id, %height, "proof start not found, duration unknown");
        }
        found
    }
}

/// Most recent peer-count sample in the tail.
pub fn latest_peer_count(lines: &[LogLine]) -> Option<u32> {
    lines
        .iter()
        .rev()
        .filter(|l| EventKind::PeerCountSample.may_match(&l.text))
        .find_map(|l| match extract(&l.text) {
            Some(Event::PeerCountSample { count }) => Some(count),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;

    use chrono::{Duration, Local, NaiveDate, TimeZone};
    use fleet_state::StateStore;

    use crate::error::TelemetryError;
    use crate::source::FileLogSource;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(11, 30, 0)
            .unwrap()
    }

    fn setup(content: &str) -> (tempfile::TempDir, PathBuf, Ingestor<StateStore>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner2.log");
        std::fs::write(&path, content).unwrap();
        touch(&path, now());
        let store = StateStore::open_in_memory().unwrap();
        (dir, path, Ingestor::new(store, IngestSettings::default()))
    }

    fn append(path: &Path, content: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        touch(path, now());
    }

    /// Pin the log's mtime so stamps anchor against the test clock.
    fn touch(path: &Path, at: NaiveDateTime) {
        let mtime: SystemTime = Local.from_local_datetime(&at).single().unwrap().into();
        OpenOptions::new()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn block_line(h: u64, secs: u32) -> String {
        format!("I (11:{:02}:{:02}) added to validated blocks at {h}\n", secs / 60, secs % 60)
    }

    #[test]
    fn first_update_backfills_every_series() {
        let log = "\
I (11:00:00) starting proving attempt
I (11:00:01) mining-on block 1.000
I (11:00:30) added to validated blocks at 1.000
I (11:00:40) finished-proof block 1.000
I (11:01:00) starting proving attempt
I (11:01:10) connected peers: 12
I (11:01:30) heard block q height 1.002
";
        let (_dir, path, ingestor) = setup(log);
        let update = ingestor.update(2, &FileLogSource::new(&path), now(), false).unwrap();

        assert_eq!(update.blocks, SeriesUpdate { mode: IngestMode::Bulk, inserted: 1 });
        assert_eq!(update.proofs.inserted, 1);
        assert_eq!(update.attempts.inserted, 2);
        assert_eq!(update.height, Some(Height(1_002)));
        assert_eq!(update.peers, Some(12));

        let proofs: Vec<ProofRow> = ingestor.read_recent(2, 10).unwrap();
        assert_eq!(proofs[0].duration_secs(), Some(39));
    }

    #[test]
    fn unchanged_tail_never_grows_store() {
        let log: String = (0..10).map(|i| block_line(100 + i, i as u32 * 10)).collect();
        let (_dir, path, ingestor) = setup(&log);
        let source = FileLogSource::new(&path);

        ingestor.update(2, &source, now(), false).unwrap();
        let before = ingestor.store().count::<BlockRow>(2).unwrap();
        let again = ingestor.update(2, &source, now(), false).unwrap();
        let forced = ingestor.update(2, &source, now(), true).unwrap();

        assert_eq!(before, 10);
        assert_eq!(again.blocks, SeriesUpdate { mode: IngestMode::Incremental, inserted: 0 });
        assert_eq!(forced.blocks, SeriesUpdate { mode: IngestMode::Bulk, inserted: 0 });
        assert_eq!(ingestor.store().count::<BlockRow>(2).unwrap(), 10);
    }

    #[test]
    fn incremental_takes_only_the_newest_line_until_reconciled() {
        let (_dir, path, ingestor) = setup(&block_line(100, 0));
        let source = FileLogSource::new(&path);
        ingestor.update(2, &source, now(), false).unwrap();

        append(&path, &(block_line(101, 10) + &block_line(102, 20) + &block_line(103, 30)));
        let inc = ingestor.update(2, &source, now(), false).unwrap();
        assert_eq!(inc.blocks, SeriesUpdate { mode: IngestMode::Incremental, inserted: 1 });
        let heights: Vec<u64> = ingestor
            .read_recent::<BlockRow>(2, 10)
            .unwrap()
            .iter()
            .map(|b| b.height.get())
            .collect();
        assert_eq!(heights, vec![100, 103]);

        let bulk = ingestor.update(2, &source, now(), true).unwrap();
        assert_eq!(bulk.blocks.inserted, 2);
        assert_eq!(ingestor.store().count::<BlockRow>(2).unwrap(), 4);
    }

    #[test]
    fn stamps_keep_their_day_as_the_clock_passes_them() {
        // Written yesterday at noon; "12:00:00" is still ahead of 11:30 today.
        let (_dir, path, ingestor) = setup("I (12:00:00) added to validated blocks at 50\n");
        let yesterday = now().date().pred_opt().unwrap();
        touch(&path, yesterday.and_hms_opt(12, 0, 5).unwrap());
        let source = FileLogSource::new(&path);

        ingestor.update(2, &source, now(), false).unwrap();
        assert_eq!(ingestor.store().count::<BlockRow>(2).unwrap(), 1);

        let after_stamp = now() + Duration::hours(1);
        let update = ingestor.update(2, &source, after_stamp, true).unwrap();
        assert_eq!(update.blocks.inserted, 0);
        assert_eq!(ingestor.store().count::<BlockRow>(2).unwrap(), 1);

        let rows: Vec<BlockRow> = ingestor.read_recent(2, 10).unwrap();
        assert_eq!(rows[0].at, epoch_secs(yesterday.and_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn stale_series_is_backfilled() {
        let (_dir, path, ingestor) = setup("I (08:00:00) added to validated blocks at 50\n");
        let source = FileLogSource::new(&path);
        ingestor.update(2, &source, now(), false).unwrap();

        append(&path, &(block_line(51, 0) + &block_line(52, 5)));
        let update = ingestor.update(2, &source, now(), false).unwrap();
        assert_eq!(update.blocks, SeriesUpdate { mode: IngestMode::Bulk, inserted: 2 });
    }

    #[test]
    fn retention_caps_backfill() {
        let log: String = (0..80).map(|i| block_line(1_000 + i, i as u32)).collect();
        let (_dir, path, ingestor) = setup(&log);
        let update = ingestor.update(2, &FileLogSource::new(&path), now(), false).unwrap();

        assert_eq!(update.blocks.inserted, 50);
        let rows: Vec<BlockRow> = ingestor.read_recent(2, 100).unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0].height, Height(1_030));
        assert_eq!(rows[49].height, Height(1_079));
    }

    #[test]
    fn proof_start_recovered_from_window_outside_tail() {
        let log = format!(
            "I (10:00:00) mining-on block 777\n{}\nI (10:02:00) finished-proof block 777\n",
            "x".repeat(40)
        );
        let (_dir, path, store_ingestor) = setup(&log);
        let settings = IngestSettings { tail_bytes: 45, ..IngestSettings::default() };
        let ingestor = Ingestor::new(store_ingestor.store().clone(), settings);

        ingestor.update(2, &FileLogSource::new(&path), now(), false).unwrap();
        let proofs: Vec<ProofRow> = ingestor.read_recent(2, 10).unwrap();
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].duration_secs(), Some(120));
    }

    #[test]
    fn uncorrelated_proof_is_stored_without_start() {
        let (_dir, path, ingestor) = setup("I (11:30:00) finished-proof block 9\n");
        ingestor.update(2, &FileLogSource::new(&path), now(), false).unwrap();
        let proofs: Vec<ProofRow> = ingestor.read_recent(2, 10).unwrap();
        assert_eq!(proofs[0].started_at, None);
    }

    #[test]
    fn missing_log_is_source_unavailable() {
        let (dir, _path, ingestor) = setup("");
        let source = FileLogSource::new(dir.path().join("miner7.log"));
        assert!(matches!(
            ingestor.update(7, &source, now(), false),
            Err(TelemetryError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn latest_peer_count_prefers_newest() {
        let lines = vec![
            LogLine { offset: 0, text: "peers: 3".into() },
            LogLine { offset: 9, text: "connected peers: 8".into() },
        ];
        assert_eq!(latest_peer_count(&lines), Some(8));
        assert_eq!(latest_peer_count(&[]), None);
    }
}
