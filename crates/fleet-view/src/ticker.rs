//! Fleet view loop — refreshes every worker on a fixed interval.
//!
//! One tick reads every worker in parallel on the blocking pool, each
//! bounded by the read timeout, then waits for all of them before
//! aggregating. A worker that is down, unreadable or slow this tick is
//! shown as inactive and retried on the next one. At most one update per
//! worker runs at a time: a worker whose previous read is still stuck
//! after its timeout is skipped until that read returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use fleet_core::{FleetConfig, Role, WorkerId};
use fleet_planner::Plan;
use fleet_state::SeriesStore;
use fleet_telemetry::clock::epoch_secs;
use fleet_telemetry::{
    Advisory, FileLogSource, HeightFeed, IngestSettings, Ingestor, LogSource, SnapshotDirFeed,
    TelemetryError, WorkerMetrics, WorkerUpdate, lag, reference_height,
};

use crate::probe::ProcessProbe;
use crate::snapshot::{FleetSnapshot, WorkerRow};
use crate::status::derive_status;

/// A worker the view watches.
#[derive(Clone)]
pub struct WatchedWorker {
    pub id: WorkerId,
    pub role: Role,
    pub source: Arc<dyn LogSource>,
}

/// Loop timing, lifted out of the telemetry config.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub refresh: Duration,
    pub reconcile: Duration,
    pub read_timeout: Duration,
}

/// What one worker's blocking task produced.
enum Observation {
    NotRunning,
    Updated(Box<WorkerUpdate>, WorkerMetrics),
}

/// Clears a worker's in-flight flag when its blocking update ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FleetView<S: SeriesStore> {
    ingestor: Ingestor<S>,
    workers: Vec<WatchedWorker>,
    /// One flag per entry of `workers`.
    in_flight: Vec<Arc<AtomicBool>>,
    probe: Arc<dyn ProcessProbe>,
    feed: Option<Arc<dyn HeightFeed>>,
    intervals: Intervals,
}

impl<S: SeriesStore> FleetView<S> {
    pub fn new(
        ingestor: Ingestor<S>,
        workers: Vec<WatchedWorker>,
        probe: Arc<dyn ProcessProbe>,
        intervals: Intervals,
    ) -> Self {
        let in_flight = workers.iter().map(|_| Arc::new(AtomicBool::new(false))).collect();
        Self {
            ingestor,
            workers,
            in_flight,
            probe,
            feed: None,
            intervals,
        }
    }

    /// Watch every worker of `plan`, reading the log files the config names.
    pub fn from_config(config: &FleetConfig, plan: &Plan, store: S, probe: Arc<dyn ProcessProbe>) -> Self {
        let t = &config.telemetry;
        let workers = plan
            .workers
            .iter()
            .map(|w| WatchedWorker {
                id: w.id,
                role: w.role,
                source: Arc::new(FileLogSource::new(config.log_path(w.id))) as Arc<dyn LogSource>,
            })
            .collect();
        let intervals = Intervals {
            refresh: t.refresh_interval(),
            reconcile: t.reconcile_interval(),
            read_timeout: t.read_timeout(),
        };
        let view = Self::new(Ingestor::new(store, IngestSettings::from(t)), workers, probe, intervals);
        match &config.feed.snapshot_dir {
            Some(dir) => view.with_feed(Arc::new(SnapshotDirFeed::new(dir))),
            None => view,
        }
    }

    pub fn with_feed(mut self, feed: Arc<dyn HeightFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn ingestor(&self) -> &Ingestor<S> {
        &self.ingestor
    }

    /// Run one tick: update every worker, then aggregate.
    pub async fn tick(&self, now: NaiveDateTime, force_bulk: bool) -> FleetSnapshot {
        let mut set = JoinSet::new();
        for (worker, flag) in self.workers.iter().zip(&self.in_flight) {
            if flag.swap(true, Ordering::AcqRel) {
                warn!(worker = worker.id, "previous update still running, skipping");
                continue;
            }
            let guard = InFlight(Arc::clone(flag));
            let ingestor = self.ingestor.clone();
            let probe = Arc::clone(&self.probe);
            let source = Arc::clone(&worker.source);
            let id = worker.id;
            let timeout = self.intervals.read_timeout;
            let window = ingestor.settings().retention;

            set.spawn(async move {
                let task = tokio::task::spawn_blocking(move || -> Result<Observation, TelemetryError> {
                    let _guard = guard;
                    if !probe.is_running(id) {
                        return Ok(Observation::NotRunning);
                    }
                    let update = ingestor.update(id, source.as_ref(), now, force_bulk)?;
                    let metrics = WorkerMetrics::read(ingestor.store(), id, window)?;
                    Ok(Observation::Updated(Box::new(update), metrics))
                });
                let outcome = match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => {
                        error!(worker = id, error = %join_err, "worker update task failed");
                        Ok(Observation::NotRunning)
                    }
                    Err(_) => Err(TelemetryError::Timeout {
                        worker: id,
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                (id, outcome)
            });
        }

        let mut observed: BTreeMap<WorkerId, Observation> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let Ok((id, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(obs) => {
                    observed.insert(id, obs);
                }
                Err(e @ TelemetryError::State(_)) => {
                    error!(worker = id, error = %e, "metric store failure");
                }
                Err(e) => {
                    warn!(worker = id, error = %e, "worker unreadable this tick");
                }
            }
        }

        let reference = reference_height(observed.values().map(|obs| match obs {
            Observation::Updated(update, _) => update.height,
            Observation::NotRunning => None,
        }));

        let workers: Vec<WorkerRow> = self
            .workers
            .iter()
            .map(|w| match observed.remove(&w.id) {
                Some(Observation::Updated(update, metrics)) => {
                    let worker_lag = lag(reference, update.height);
                    WorkerRow {
                        id: w.id,
                        role: w.role,
                        status: derive_status(true, w.role.mines(), worker_lag),
                        height: update.height,
                        lag: worker_lag,
                        peers: update.peers,
                        metrics,
                    }
                }
                _ => WorkerRow::inactive(w.id, w.role),
            })
            .collect();

        let advisory = self
            .feed
            .as_ref()
            .map(|feed| Advisory::compare(feed.as_ref(), reference));

        let snapshot = FleetSnapshot {
            taken_at: epoch_secs(now),
            reconciled: force_bulk,
            reference_height: reference,
            workers,
            advisory,
        };
        debug!(
            reference = ?snapshot.reference_height,
            workers = snapshot.workers.len(),
            reconciled = force_bulk,
            "tick complete"
        );
        snapshot
    }

    /// Tick on the refresh interval, forcing a bulk backfill on the
    /// reconcile interval, until `shutdown` changes. Each snapshot is
    /// published on `publish`.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        publish: watch::Sender<Option<FleetSnapshot>>,
    ) {
        let mut refresh = tokio::time::interval(self.intervals.refresh);
        let mut reconcile = tokio::time::interval(self.intervals.reconcile);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            workers = self.workers.len(),
            refresh_secs = self.intervals.refresh.as_secs(),
            reconcile_secs = self.intervals.reconcile.as_secs(),
            "fleet view loop started"
        );

        loop {
            let force_bulk = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = reconcile.tick() => true,
                _ = refresh.tick() => false,
            };
            let snapshot = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                snapshot = self.tick(Local::now().naive_local(), force_bulk) => snapshot,
            };
            publish.send_replace(Some(snapshot));
        }

        info!("fleet view loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use chrono::NaiveDate;
    use fleet_core::Height;
    use fleet_planner::plan;
    use fleet_state::{BlockRow, StateStore};
    use fleet_telemetry::{LogLine, TelemetryResult};

    use crate::probe::AssumeRunning;
    use crate::status::WorkerStatus;

    struct Down(BTreeSet<WorkerId>);

    impl ProcessProbe for Down {
        fn is_running(&self, worker_id: WorkerId) -> bool {
            !self.0.contains(&worker_id)
        }
    }

    struct Slow;

    impl LogSource for Slow {
        fn tail(&self, _max_bytes: u64) -> TelemetryResult<Vec<LogLine>> {
            std::thread::sleep(Duration::from_millis(1_000));
            Ok(Vec::new())
        }
        fn window(&self, _center: u64, _radius: u64) -> TelemetryResult<(String, usize)> {
            Ok((String::new(), 0))
        }
    }

    /// Slow source that records how many reads overlap.
    #[derive(Default)]
    struct Stuck {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl LogSource for Stuck {
        fn tail(&self, _max_bytes: u64) -> TelemetryResult<Vec<LogLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(600));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        fn window(&self, _center: u64, _radius: u64) -> TelemetryResult<(String, usize)> {
            Ok((String::new(), 0))
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(11, 30, 0)
            .unwrap()
    }

    fn intervals() -> Intervals {
        Intervals {
            refresh: Duration::from_millis(20),
            reconcile: Duration::from_secs(3600),
            read_timeout: Duration::from_millis(250),
        }
    }

    fn write_log(dir: &Path, id: WorkerId, heights: &[u64]) {
        let text: String = heights
            .iter()
            .enumerate()
            .map(|(i, h)| format!("I (11:00:{i:02}) added to validated blocks at {h}\n"))
            .collect();
        std::fs::write(dir.join(format!("miner{id}.log")), text).unwrap();
    }

    fn config(dir: &Path) -> FleetConfig {
        let mut cfg = FleetConfig::scaffold(20, 40);
        cfg.fleet.log_dir = dir.to_path_buf();
        cfg
    }

    fn worker(id: WorkerId, role: Role, source: Arc<dyn LogSource>) -> WatchedWorker {
        WatchedWorker { id, role, source }
    }

    #[tokio::test]
    async fn tick_derives_status_and_lag() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), 1, &[998, 999, 1_000]);
        write_log(dir.path(), 2, &[995, 997]);
        let cfg = config(dir.path());
        let plan = plan(20, 40).unwrap();
        let store = StateStore::open_in_memory().unwrap();
        let view = FleetView::from_config(&cfg, &plan, store, Arc::new(AssumeRunning));

        let snap = view.tick(now(), false).await;
        assert_eq!(snap.reference_height, Some(Height(1_000)));

        let tracking = snap.worker(1).unwrap();
        assert_eq!(tracking.status, WorkerStatus::SyncOnly);
        assert_eq!(tracking.lag, Some(0));

        let producing = snap.worker(2).unwrap();
        assert_eq!(producing.status, WorkerStatus::Syncing);
        assert_eq!(producing.lag, Some(3));
        assert_eq!(producing.metrics.last_block, Some(Height(997)));
        assert_eq!(view.ingestor().store().count::<BlockRow>(2).unwrap(), 2);
    }

    #[tokio::test]
    async fn down_or_missing_workers_are_inactive() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), 2, &[10]);
        let cfg = config(dir.path());
        let store = StateStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(store, IngestSettings::default());
        let source = |id| Arc::new(FileLogSource::new(cfg.log_path(id))) as Arc<dyn LogSource>;
        let view = FleetView::new(
            ingestor,
            vec![
                worker(1, Role::Tracking, source(1)),
                worker(2, Role::Producing, source(2)),
                worker(3, Role::Producing, source(3)),
            ],
            Arc::new(Down(BTreeSet::from([2]))),
            intervals(),
        );

        let snap = view.tick(now(), false).await;
        assert_eq!(snap.count(WorkerStatus::Inactive), 3);
        assert_eq!(snap.reference_height, None);
        assert_eq!(snap.worker(3).unwrap().lag, None);
    }

    #[tokio::test]
    async fn slow_worker_times_out_without_blocking_the_tick() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), 2, &[500]);
        let cfg = config(dir.path());
        let store = StateStore::open_in_memory().unwrap();
        let view = FleetView::new(
            Ingestor::new(store, IngestSettings::default()),
            vec![
                worker(1, Role::Tracking, Arc::new(Slow)),
                worker(2, Role::Producing, Arc::new(FileLogSource::new(cfg.log_path(2)))),
            ],
            Arc::new(AssumeRunning),
            intervals(),
        );

        let snap = view.tick(now(), false).await;
        assert_eq!(snap.worker(1).unwrap().status, WorkerStatus::Inactive);
        assert_eq!(snap.worker(2).unwrap().status, WorkerStatus::Mining);
    }

    #[tokio::test]
    async fn stuck_worker_is_not_read_twice_at_once() {
        let stuck = Arc::new(Stuck::default());
        let view = FleetView::new(
            Ingestor::new(StateStore::open_in_memory().unwrap(), IngestSettings::default()),
            vec![worker(2, Role::Producing, Arc::clone(&stuck) as Arc<dyn LogSource>)],
            Arc::new(AssumeRunning),
            Intervals { read_timeout: Duration::from_millis(100), ..intervals() },
        );

        for _ in 0..3 {
            let snap = view.tick(now(), false).await;
            assert_eq!(snap.worker(2).unwrap().status, WorkerStatus::Inactive);
        }
        assert_eq!(stuck.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stuck.peak.load(Ordering::SeqCst), 1);

        // Once the stuck read returns the worker is read again.
        tokio::time::sleep(Duration::from_millis(800)).await;
        view.tick(now(), false).await;
        assert_eq!(stuck.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_publishes_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), 1, &[7]);
        let cfg = config(dir.path());
        let store = StateStore::open_in_memory().unwrap();
        let view = FleetView::new(
            Ingestor::new(store, IngestSettings::default()),
            vec![worker(1, Role::Tracking, Arc::new(FileLogSource::new(cfg.log_path(1))))],
            Arc::new(AssumeRunning),
            intervals(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (publish_tx, mut publish_rx) = watch::channel(None);

        let stopper = async {
            publish_rx.changed().await.unwrap();
            let first = publish_rx.borrow().clone().unwrap();
            shutdown_tx.send(true).unwrap();
            first
        };
        let (_, first) = tokio::join!(view.run(shutdown_rx, publish_tx), stopper);

        // The very first tick is a reconciliation.
        assert!(first.reconciled);
        assert_eq!(first.reference_height, Some(Height(7)));
    }
}
