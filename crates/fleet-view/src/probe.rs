//! Process liveness probes.
//!
//! The view asks one question of the supervisor: is this worker running.
//! Probes are blocking and are called from the blocking pool.

use std::process::{Command, Stdio};

use tracing::debug;

use fleet_core::WorkerId;
use fleet_planner::unit_name;

pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, worker_id: WorkerId) -> bool;
}

/// Asks systemd whether `{prefix}{id}.service` is active.
#[derive(Debug, Clone)]
pub struct SystemdProbe {
    prefix: String,
}

impl SystemdProbe {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl ProcessProbe for SystemdProbe {
    fn is_running(&self, worker_id: WorkerId) -> bool {
        let unit = unit_name(&self.prefix, worker_id);
        match Command::new("systemctl")
            .args(["is-active", "--quiet", &unit])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!(%unit, error = %e, "cannot run systemctl");
                false
            }
        }
    }
}

/// Treats every worker as running; liveness then rests on log readability.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeRunning;

impl ProcessProbe for AssumeRunning {
    fn is_running(&self, _worker_id: WorkerId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assume_running_is_always_true() {
        assert!(AssumeRunning.is_running(1));
        assert!(AssumeRunning.is_running(99));
    }

    #[test]
    fn unknown_unit_is_not_running() {
        // Either systemctl is missing or the unit does not exist.
        let probe = SystemdProbe::new("minerfleet-test-nonexistent-");
        assert!(!probe.is_running(4_000_000));
    }
}
