//! fleet.toml configuration parser.
//!
//! The config is read once at startup and handed to every subsystem by
//! reference; nothing downstream consults the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{MemoryTier, PlannerMode, TopologyMode, WorkerId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub host: HostConfig,
    pub fleet: FleetSection,
    pub planner: PlannerConfig,
    pub topology: TopologyConfig,
    pub worker: WorkerConfig,
    pub telemetry: TelemetryConfig,
    pub feed: FeedConfig,
}

/// Host resources the planner partitions. Missing values are detected
/// by the daemon before the config is frozen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub threads: Option<u64>,
    pub memory_gb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSection {
    /// Directory holding one log file per worker.
    pub log_dir: PathBuf,
    /// Log file name template; `{id}` is replaced by the worker id.
    pub log_file: String,
    /// Directory for the metric store database.
    pub state_dir: PathBuf,
    /// Prefix for supervisor unit names (`{prefix}{id}.service`).
    pub unit_prefix: String,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/minerfleet"),
            log_file: "miner{id}.log".to_string(),
            state_dir: PathBuf::from("/var/lib/minerfleet"),
            unit_prefix: "miner".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub mode: PlannerMode,
    /// Producing workers for custom mode.
    pub workers: Vec<CustomWorkerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomWorkerConfig {
    pub id: WorkerId,
    pub threads: u64,
    pub tier: MemoryTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub mode: TopologyMode,
    /// Worker `n` binds `base_port + n`.
    pub base_port: u16,
    /// Address peers are reached on when the topology is generated.
    pub host: String,
    /// Operator-supplied peer strings keyed by worker id (custom mode).
    pub custom: BTreeMap<String, Vec<String>>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            mode: TopologyMode::None,
            base_port: 3006,
            host: "127.0.0.1".to_string(),
            custom: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub binary: PathBuf,
    pub working_dir: PathBuf,
    pub mining_pubkey: Option<String>,
    pub max_established: u32,
    pub bind_host: String,
    pub state_jam: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/local/bin/nockchain"),
            working_dir: PathBuf::from("/var/lib/minerfleet"),
            mining_pubkey: None,
            max_established: 64,
            bind_host: "0.0.0.0".to_string(),
            state_jam: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Live view refresh interval.
    pub refresh_secs: u64,
    /// Forced bulk reconciliation interval.
    pub reconcile_secs: u64,
    /// A series whose newest row is older than this is backfilled in bulk.
    pub staleness_secs: u64,
    /// Rows kept per worker per series.
    pub retention: usize,
    /// Raw matching lines considered by a bulk backfill.
    pub bulk_line_limit: usize,
    /// Bytes read from the end of a log per tick.
    pub tail_bytes: u64,
    /// Half-width of the raw window scanned to correlate proofs.
    pub window_radius: u64,
    /// Per-worker budget for one tick's log reads and store writes.
    pub read_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 2,
            reconcile_secs: 3600,
            staleness_secs: 3600,
            retention: 50,
            bulk_line_limit: 200,
            tail_bytes: 4 * 1024 * 1024,
            window_radius: 3000,
            read_timeout_ms: 1500,
        }
    }
}

impl TelemetryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Directory of exported state snapshots whose names carry a height.
    pub snapshot_dir: Option<PathBuf>,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FleetConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would make the tick loop or store misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.telemetry;
        if t.refresh_secs == 0 || t.reconcile_secs == 0 {
            return Err(ConfigError::Invalid(
                "telemetry intervals must be positive".to_string(),
            ));
        }
        if t.retention == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.retention must be at least 1".to_string(),
            ));
        }
        if t.bulk_line_limit == 0 || t.tail_bytes == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.bulk_line_limit and telemetry.tail_bytes must be positive".to_string(),
            ));
        }
        if !self.fleet.log_file.contains("{id}") {
            return Err(ConfigError::Invalid(format!(
                "fleet.log_file {:?} must contain {{id}}",
                self.fleet.log_file
            )));
        }
        Ok(())
    }

    /// Path of a worker's log file.
    pub fn log_path(&self, id: WorkerId) -> PathBuf {
        self.fleet
            .log_dir
            .join(self.fleet.log_file.replace("{id}", &id.to_string()))
    }

    /// Path of the metric store database.
    pub fn store_path(&self) -> PathBuf {
        self.fleet.state_dir.join("minerfleet.redb")
    }

    /// Scaffold a config with the detected host resources filled in.
    pub fn scaffold(threads: u64, memory_gb: u64) -> Self {
        FleetConfig {
            host: HostConfig {
                threads: Some(threads),
                memory_gb: Some(memory_gb),
            },
            ..FleetConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_round_trips() {
        let config = FleetConfig::scaffold(32, 128);
        let toml_str = config.to_toml_string().unwrap();
        let parsed: FleetConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.host.threads, Some(32));
        assert_eq!(parsed.host.memory_gb, Some(128));
        assert_eq!(parsed.telemetry.retention, 50);
    }

    #[test]
    fn test_parse_minimal() {
        let config: FleetConfig = toml::from_str("").unwrap();
        assert_eq!(config.planner.mode, PlannerMode::Recommended);
        assert_eq!(config.topology.mode, TopologyMode::None);
        assert_eq!(config.telemetry.refresh_secs, 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_custom_workers_and_peers() {
        let toml_str = r#"
[host]
threads = 24
memory_gb = 96

[planner]
mode = "custom"

[[planner.workers]]
id = 2
threads = 12
tier = "large"

[[planner.workers]]
id = 3
threads = 11
tier = "medium"

[topology]
mode = "custom"

[topology.custom]
"2" = ["/ip4/10.0.0.5/udp/3006/quic-v1"]
"#;
        let config: FleetConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.planner.mode, PlannerMode::Custom);
        assert_eq!(config.planner.workers.len(), 2);
        assert_eq!(config.planner.workers[0].tier, MemoryTier::Large);
        assert_eq!(config.topology.custom["2"].len(), 1);
        assert!(!config.topology.custom.contains_key("3"));
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = FleetConfig::default();
        config.telemetry.retention = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_log_path_template() {
        let mut config = FleetConfig::default();
        config.fleet.log_dir = PathBuf::from("/logs");
        assert_eq!(config.log_path(3), PathBuf::from("/logs/miner3.log"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "[telemetry]\nrefresh_secs = 5\n").unwrap();
        let config = FleetConfig::from_file(&path).unwrap();
        assert_eq!(config.telemetry.refresh_secs, 5);
        assert!(FleetConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
