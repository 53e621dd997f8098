//! Capacity planner — partitions one host into workers.
//!
//! Worker 1 always tracks the chain without mining. Recommended mode
//! hands everything else to producing workers, largest memory tier first.
//! Custom mode takes operator entries as they are and checks them only
//! when the plan is accepted.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use fleet_core::config::CustomWorkerConfig;
use fleet_core::{MemoryTier, Role, TRACKING_WORKER, WorkerId};

use crate::error::{PlanError, PlanResult};

/// Memory left to the operating system, never given to a worker.
pub const OS_RESERVED_GB: u64 = 4;
pub const TRACKING_THREADS: u64 = 1;
pub const TRACKING_MEMORY_GB: u64 = 2;

/// One worker in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedWorker {
    pub id: WorkerId,
    pub role: Role,
    pub threads: u64,
    /// Memory tier flag; the tracking worker runs without one.
    pub tier: Option<MemoryTier>,
    pub memory_gb: u64,
}

impl PlannedWorker {
    pub fn tracking() -> Self {
        Self {
            id: TRACKING_WORKER,
            role: Role::Tracking,
            threads: TRACKING_THREADS,
            tier: None,
            memory_gb: TRACKING_MEMORY_GB,
        }
    }

    pub fn producing(id: WorkerId, threads: u64, tier: MemoryTier) -> Self {
        Self {
            id,
            role: Role::Producing,
            threads,
            tier: Some(tier),
            memory_gb: tier.gb(),
        }
    }
}

/// An accepted partition of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub host_threads: u64,
    pub host_memory_gb: u64,
    pub workers: Vec<PlannedWorker>,
}

impl Plan {
    pub fn total_threads(&self) -> u64 {
        self.workers.iter().map(|w| w.threads).sum()
    }

    /// Worker memory plus the OS reservation.
    pub fn total_memory_gb(&self) -> u64 {
        self.workers.iter().map(|w| w.memory_gb).sum::<u64>() + OS_RESERVED_GB
    }

    pub fn worker(&self, id: WorkerId) -> Option<&PlannedWorker> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id).collect()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<6} {:<10} {:>7}  {:<7} {:>7}",
            "WORKER", "ROLE", "THREADS", "TIER", "MEMORY"
        )?;
        for w in &self.workers {
            let tier = w.tier.map(|t| t.flag()).unwrap_or("—");
            writeln!(
                f,
                "{:<6} {:<10} {:>7}  {:<7} {:>5}GB",
                w.id,
                w.role.label(),
                w.threads,
                tier,
                w.memory_gb
            )?;
        }
        write!(
            f,
            "{} workers, {}/{} threads, {}/{}GB ({}GB reserved for the OS)",
            self.workers.len(),
            self.total_threads(),
            self.host_threads,
            self.total_memory_gb(),
            self.host_memory_gb,
            OS_RESERVED_GB
        )
    }
}

fn check_host(threads: u64, memory_gb: u64) -> PlanResult<()> {
    if threads < TRACKING_THREADS || memory_gb < OS_RESERVED_GB + TRACKING_MEMORY_GB {
        return Err(PlanError::HostTooSmall { threads, memory_gb });
    }
    Ok(())
}

/// Recommended partition of a host with `threads` hardware threads and
/// `memory_gb` of memory.
///
/// Each producing worker takes the largest tier that fits the memory
/// left and every thread left, so the loop normally ends after one
/// producing worker.
pub fn plan(threads: u64, memory_gb: u64) -> PlanResult<Plan> {
    check_host(threads, memory_gb)?;

    let mut workers = vec![PlannedWorker::tracking()];
    let mut threads_left = threads - TRACKING_THREADS;
    let mut memory_left = memory_gb - OS_RESERVED_GB - TRACKING_MEMORY_GB;
    let mut next_id = TRACKING_WORKER + 1;

    while threads_left > 0 {
        let Some(tier) = MemoryTier::largest_fitting(memory_left) else {
            break;
        };
        let assigned = threads_left;
        workers.push(PlannedWorker::producing(next_id, assigned, tier));
        debug!(worker = next_id, threads = assigned, tier = %tier, "producing worker planned");
        threads_left -= assigned;
        memory_left -= tier.gb();
        next_id += 1;
    }

    let plan = Plan {
        host_threads: threads,
        host_memory_gb: memory_gb,
        workers,
    };
    info!(
        workers = plan.workers.len(),
        threads = plan.total_threads(),
        memory_gb = plan.total_memory_gb(),
        "recommended plan computed"
    );
    Ok(plan)
}

/// An operator-supplied entry for one producing worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomEntry {
    pub id: WorkerId,
    pub threads: u64,
    pub tier: MemoryTier,
}

impl From<&CustomWorkerConfig> for CustomEntry {
    fn from(cfg: &CustomWorkerConfig) -> Self {
        Self {
            id: cfg.id,
            threads: cfg.threads,
            tier: cfg.tier,
        }
    }
}

/// An editable list of producing workers, validated on `accept`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomPlan {
    entries: Vec<CustomEntry>,
}

impl CustomPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(workers: &[CustomWorkerConfig]) -> Self {
        Self {
            entries: workers.iter().map(CustomEntry::from).collect(),
        }
    }

    pub fn entries(&self) -> &[CustomEntry] {
        &self.entries
    }

    /// Append an entry as is, even if its id is already present.
    pub fn push(&mut self, entry: CustomEntry) {
        self.entries.push(entry);
    }

    /// Replace every entry with this id by `entry`, or append it.
    pub fn set(&mut self, entry: CustomEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.push(entry);
    }

    /// Drop all entries with this id. Returns whether any were removed.
    pub fn remove(&mut self, id: WorkerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Validate against the host and freeze into a [`Plan`].
    pub fn accept(&self, threads: u64, memory_gb: u64) -> PlanResult<Plan> {
        check_host(threads, memory_gb)?;

        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if entry.id <= TRACKING_WORKER {
                return Err(PlanError::ReservedWorkerId(entry.id));
            }
            if entry.threads == 0 {
                return Err(PlanError::ZeroThreads(entry.id));
            }
            if !seen.insert(entry.id) {
                return Err(PlanError::DuplicateWorker(entry.id));
            }
        }

        let requested_threads =
            TRACKING_THREADS + self.entries.iter().map(|e| e.threads).sum::<u64>();
        if requested_threads > threads {
            return Err(PlanError::ThreadsExceeded {
                requested: requested_threads,
                available: threads,
            });
        }
        let requested_memory = OS_RESERVED_GB
            + TRACKING_MEMORY_GB
            + self.entries.iter().map(|e| e.tier.gb()).sum::<u64>();
        if requested_memory > memory_gb {
            return Err(PlanError::MemoryExceeded {
                requested: requested_memory,
                available: memory_gb,
            });
        }

        let mut producing: Vec<PlannedWorker> = self
            .entries
            .iter()
            .map(|e| PlannedWorker::producing(e.id, e.threads, e.tier))
            .collect();
        producing.sort_by_key(|w| w.id);

        let mut workers = vec![PlannedWorker::tracking()];
        workers.extend(producing);
        info!(workers = workers.len(), "custom plan accepted");
        Ok(Plan {
            host_threads: threads,
            host_memory_gb: memory_gb,
            workers,
        })
    }
}
