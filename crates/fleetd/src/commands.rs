//! Subcommand implementations.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use clap::ValueEnum;
use tokio::sync::watch;
use tracing::info;

use fleet_core::{FleetConfig, WorkerId};
use fleet_planner::{render_unit, write_units};
use fleet_state::{
    AttemptRow, BlockRow, CsvRecord, ProofRow, Series, StateStore, import_csv, to_csv,
};
use fleet_view::{AssumeRunning, FleetSnapshot, FleetView, ProcessProbe, SystemdProbe, render_prometheus};

use crate::host::HostResources;
use crate::setup::{build_plan, launch_specs, load_config, open_store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SnapshotFormat {
    Table,
    Json,
    Prometheus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeriesArg {
    Blocks,
    Proofs,
    Attempts,
}

/// `fleetd init`: write a starter config with this host's resources.
pub fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", config_path.display());
    }
    let host = HostResources::detect()?;
    let config = FleetConfig::scaffold(host.threads, host.memory_gb);
    std::fs::write(config_path, config.to_toml_string()?)
        .with_context(|| format!("writing {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        threads = host.threads,
        memory_gb = host.memory_gb,
        "config scaffolded"
    );
    println!("wrote {}", config_path.display());
    Ok(())
}

/// `fleetd plan`: print the plan and each worker's command line.
pub fn plan(config_path: &Path, format: PlanFormat) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let host = HostResources::resolve(&config)?;
    let plan = build_plan(&config, host)?;
    let specs = launch_specs(&config, &plan)?;

    match format {
        PlanFormat::Json => {
            let out = serde_json::json!({ "plan": plan, "launch": specs });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        PlanFormat::Table => {
            println!("{plan}");
            println!();
            for spec in &specs {
                println!("worker {}: {}", spec.worker_id, spec.command_line());
            }
        }
    }
    Ok(())
}

/// `fleetd units`: write one unit file per planned worker.
pub fn units(config_path: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let host = HostResources::resolve(&config)?;
    let plan = build_plan(&config, host)?;
    let units: Vec<_> = launch_specs(&config, &plan)?
        .iter()
        .map(|spec| render_unit(&config.fleet.unit_prefix, spec))
        .collect();
    let written = write_units(out_dir, &units)
        .with_context(|| format!("writing units to {}", out_dir.display()))?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn build_view(config: &FleetConfig, no_probe: bool) -> anyhow::Result<FleetView<StateStore>> {
    let host = HostResources::resolve(config)?;
    let plan = build_plan(config, host)?;
    let store = open_store(config)?;
    let probe: Arc<dyn ProcessProbe> = if no_probe {
        Arc::new(AssumeRunning)
    } else {
        Arc::new(SystemdProbe::new(config.fleet.unit_prefix.clone()))
    };
    Ok(FleetView::from_config(config, &plan, store, probe))
}

fn render(snapshot: &FleetSnapshot, format: SnapshotFormat) -> anyhow::Result<String> {
    Ok(match format {
        SnapshotFormat::Table => snapshot.to_string(),
        SnapshotFormat::Json => snapshot.to_json()?,
        SnapshotFormat::Prometheus => render_prometheus(snapshot),
    })
}

/// `fleetd snapshot`: run a single tick and print it.
pub async fn snapshot(config_path: &Path, format: SnapshotFormat, no_probe: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let view = build_view(&config, no_probe)?;
    let snapshot = view.tick(Local::now().naive_local(), false).await;
    println!("{}", render(&snapshot, format)?);
    Ok(())
}

/// `fleetd watch`: run the loop until Ctrl-C, printing every snapshot.
pub async fn watch_loop(config_path: &Path, format: SnapshotFormat, no_probe: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let view = build_view(&config, no_probe)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (publish_tx, mut publish_rx) = watch::channel(None);
    let handle = tokio::spawn(async move {
        view.run(shutdown_rx, publish_tx).await;
    });

    let clear = format == SnapshotFormat::Table && std::io::stdout().is_terminal();
    loop {
        tokio::select! {
            changed = publish_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = publish_rx.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    if clear {
                        print!("\x1b[2J\x1b[H");
                    }
                    println!("{}", render(&snapshot, format)?);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }

    let _ = handle.await;
    Ok(())
}

fn export_series<R: CsvRecord>(store: &StateStore, id: WorkerId, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let rows: Vec<R> = store.list(id)?;
    let path = out_dir.join(format!("miner{id}_{}.csv", R::SERIES.label()));
    std::fs::write(&path, to_csv(&rows)).with_context(|| format!("writing {}", path.display()))?;
    info!(worker = id, series = R::SERIES.label(), rows = rows.len(), "series exported");
    Ok(path)
}

/// `fleetd export`: dump every worker's series as CSV.
pub fn export(config_path: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let host = HostResources::resolve(&config)?;
    let plan = build_plan(&config, host)?;
    let store = open_store(&config)?;
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    for id in plan.worker_ids() {
        for path in [
            export_series::<BlockRow>(&store, id, out_dir)?,
            export_series::<ProofRow>(&store, id, out_dir)?,
            export_series::<AttemptRow>(&store, id, out_dir)?,
        ] {
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// `fleetd import`: load an exported CSV file back into the store.
pub fn import(config_path: &Path, series: SeriesArg, file: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let retention = config.telemetry.retention;

    let (label, inserted) = match series {
        SeriesArg::Blocks => (Series::Blocks, import_csv::<BlockRow, _>(&store, &text, retention)?),
        SeriesArg::Proofs => (Series::Proofs, import_csv::<ProofRow, _>(&store, &text, retention)?),
        SeriesArg::Attempts => (Series::Attempts, import_csv::<AttemptRow, _>(&store, &text, retention)?),
    };
    info!(series = label.label(), inserted, file = %file.display(), "series imported");
    println!("{inserted} new {} rows", label.label());
    Ok(())
}
