//! fleetd — the minerfleet daemon.
//!
//! Single binary for a mining host:
//! - Capacity plan (recommended or custom) from `fleet.toml`
//! - Worker command lines and systemd units
//! - Live fleet view over the workers' logs (redb metric store)
//! - CSV export / import of the stored series
//!
//! # Usage
//!
//! ```text
//! fleetd init
//! fleetd plan
//! fleetd units --out-dir /etc/systemd/system
//! fleetd watch
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod host;
mod setup;

use commands::{PlanFormat, SeriesArg, SnapshotFormat};

#[derive(Parser)]
#[command(name = "fleetd", about = "minerfleet daemon", version, propagate_version = true)]
struct Cli {
    /// Path to fleet.toml.
    #[arg(long, global = true, default_value = "fleet.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config with this host's threads and memory.
    Init {
        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },
    /// Show the capacity plan and each worker's command line.
    Plan {
        #[arg(long, value_enum, default_value = "table")]
        format: PlanFormat,
    },
    /// Write one systemd unit per planned worker.
    Units {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Run one refresh and print the fleet snapshot.
    Snapshot {
        #[arg(long, value_enum, default_value = "table")]
        format: SnapshotFormat,

        /// Skip the systemd liveness probe and treat every worker as running.
        #[arg(long)]
        no_probe: bool,
    },
    /// Refresh continuously until Ctrl-C.
    Watch {
        #[arg(long, value_enum, default_value = "table")]
        format: SnapshotFormat,

        #[arg(long)]
        no_probe: bool,
    },
    /// Export every worker's stored series as CSV.
    Export {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Import a previously exported CSV file.
    Import {
        #[arg(long, value_enum)]
        series: SeriesArg,

        file: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetd=debug,fleet=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Init { force } => commands::init(&cli.config, force),
        Command::Plan { format } => commands::plan(&cli.config, format),
        Command::Units { out_dir } => commands::units(&cli.config, &out_dir),
        Command::Snapshot { format, no_probe } => {
            commands::snapshot(&cli.config, format, no_probe).await
        }
        Command::Watch { format, no_probe } => {
            commands::watch_loop(&cli.config, format, no_probe).await
        }
        Command::Export { out_dir } => commands::export(&cli.config, &out_dir),
        Command::Import { series, file } => commands::import(&cli.config, series, &file),
    }
}
