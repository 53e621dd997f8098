//! systemd unit files for planned workers.

use std::path::{Path, PathBuf};

use tracing::info;

use fleet_core::WorkerId;

use crate::launch::LaunchSpec;

/// Seconds systemd waits before restarting a failed worker.
pub const RESTART_SEC: u32 = 10;

/// A rendered unit file: `{prefix}{id}.service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    pub name: String,
    pub contents: String,
}

/// Service name for a worker, as passed to `systemctl`.
pub fn unit_name(prefix: &str, worker_id: WorkerId) -> String {
    format!("{prefix}{worker_id}.service")
}

pub fn render_unit(prefix: &str, spec: &LaunchSpec) -> UnitDefinition {
    let log = spec.log_path.display();
    let contents = format!(
        "[Unit]\n\
Description=minerfleet worker {id}\n\
After=network-online.target\n\
Wants=network-online.target\n\
\n\
[Service]\n\
Type=simple\n\
WorkingDirectory={wd}\n\
ExecStart={exec}\n\
StandardOutput=append:{log}\n\
StandardError=append:{log}\n\
Restart=on-failure\n\
RestartSec={RESTART_SEC}\n\
\n\
[Install]\n\
WantedBy=multi-user.target\n",
        id = spec.worker_id,
        wd = spec.working_dir.display(),
        exec = spec.command_line(),
    );
    UnitDefinition {
        name: unit_name(prefix, spec.worker_id),
        contents,
    }
}

/// Write each unit into `dir`, creating it if needed.
pub fn write_units(dir: &Path, units: &[UnitDefinition]) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(units.len());
    for unit in units {
        let path = dir.join(&unit.name);
        std::fs::write(&path, &unit.contents)?;
        info!(unit = %unit.name, path = %path.display(), "unit file written");
        written.push(path);
    }
    Ok(written)
}
