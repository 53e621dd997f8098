//! Launch specs — the exact argument vector each planned worker runs with.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use fleet_core::{FleetConfig, WorkerId};

use crate::planner::PlannedWorker;
use crate::topology::{PeerAddress, worker_port};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub worker_id: WorkerId,
    pub binary: PathBuf,
    pub working_dir: PathBuf,
    /// Where the supervisor sends the worker's output.
    pub log_path: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Map a planned worker to its command line. The same inputs always
    /// give the same argument vector.
    pub fn from_plan(worker: &PlannedWorker, config: &FleetConfig, peers: &[PeerAddress]) -> Self {
        let mut args = Vec::new();

        if worker.role.mines() {
            args.push("--mine".to_string());
            match &config.worker.mining_pubkey {
                Some(key) => {
                    args.push("--mining-pubkey".to_string());
                    args.push(key.clone());
                }
                None => warn!(worker = worker.id, "producing worker has no mining pubkey"),
            }
            args.push("--num-threads".to_string());
            args.push(worker.threads.to_string());
        }
        if let Some(tier) = worker.tier {
            args.push("--stack-size".to_string());
            args.push(tier.flag().to_string());
        }

        match bind_address(config, worker.id) {
            Some(bind) => {
                args.push("--bind".to_string());
                args.push(bind);
            }
            None => warn!(worker = worker.id, "no valid bind address, worker picks its own"),
        }
        for peer in peers {
            args.push("--peer".to_string());
            args.push(peer.to_string());
        }
        args.push("--max-established".to_string());
        args.push(config.worker.max_established.to_string());
        if let Some(jam) = &config.worker.state_jam {
            args.push("--state-jam".to_string());
            args.push(jam.display().to_string());
        }

        Self {
            worker_id: worker.id,
            binary: config.worker.binary.clone(),
            working_dir: config.worker.working_dir.join(format!("miner{}", worker.id)),
            log_path: config.log_path(worker.id),
            args,
        }
    }

    /// Binary and arguments quoted for a unit file's `ExecStart=`.
    pub fn command_line(&self) -> String {
        std::iter::once(self.binary.display().to_string())
            .chain(self.args.iter().cloned())
            .map(|arg| quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn bind_address(config: &FleetConfig, id: WorkerId) -> Option<String> {
    let host: Ipv4Addr = config.worker.bind_host.parse().ok()?;
    let port = worker_port(config.topology.base_port, id)?;
    Some(PeerAddress::new(host, port).to_string())
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '\'')) {
        return arg.to_string();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
