//! Shared startup steps: config, plan, store.

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use fleet_core::{FleetConfig, PlannerMode};
use fleet_planner::{CustomPlan, LaunchSpec, Plan, topology_from_config};
use fleet_state::StateStore;

use crate::host::HostResources;

/// Load the config file, or defaults when it does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<FleetConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(FleetConfig::default());
    }
    let config = FleetConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Build and validate the plan the config asks for.
pub fn build_plan(config: &FleetConfig, host: HostResources) -> anyhow::Result<Plan> {
    let plan = match config.planner.mode {
        PlannerMode::Recommended => fleet_planner::plan(host.threads, host.memory_gb),
        PlannerMode::Custom => {
            CustomPlan::from_config(&config.planner.workers).accept(host.threads, host.memory_gb)
        }
    }
    .with_context(|| {
        format!(
            "no feasible plan for {} threads / {}GB",
            host.threads, host.memory_gb
        )
    })?;
    info!(
        mode = ?config.planner.mode,
        workers = plan.workers.len(),
        "plan accepted"
    );
    Ok(plan)
}

/// Command lines for every planned worker, peers included.
pub fn launch_specs(config: &FleetConfig, plan: &Plan) -> anyhow::Result<Vec<LaunchSpec>> {
    let peers = topology_from_config(&config.topology, &plan.worker_ids())
        .context("invalid topology.host")?;
    Ok(plan
        .workers
        .iter()
        .map(|w| {
            let worker_peers = peers.get(&w.id).map(Vec::as_slice).unwrap_or_default();
            LaunchSpec::from_plan(w, config, worker_peers)
        })
        .collect())
}

/// Open the on-disk metric store, creating its directory.
pub fn open_store(config: &FleetConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.fleet.state_dir)
        .with_context(|| format!("creating {}", config.fleet.state_dir.display()))?;
    let path = config.store_path();
    let store = StateStore::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(store)
}
