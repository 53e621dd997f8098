//! Host resource detection.
//!
//! This is the only place the daemon looks at the machine it runs on.
//! Values from the config always win over detected ones.

use anyhow::{Context, bail};

use fleet_core::FleetConfig;

/// Hardware threads and memory available for the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    pub threads: u64,
    pub memory_gb: u64,
}

impl HostResources {
    /// Config values, falling back to detection for anything unset.
    pub fn resolve(config: &FleetConfig) -> anyhow::Result<Self> {
        let threads = match config.host.threads {
            Some(t) => t,
            None => detect_threads()?,
        };
        let memory_gb = match config.host.memory_gb {
            Some(m) => m,
            None => detect_memory_gb()?,
        };
        Ok(Self { threads, memory_gb })
    }

    pub fn detect() -> anyhow::Result<Self> {
        Ok(Self {
            threads: detect_threads()?,
            memory_gb: detect_memory_gb()?,
        })
    }
}

pub fn detect_threads() -> anyhow::Result<u64> {
    let n = std::thread::available_parallelism().context("cannot detect hardware threads")?;
    Ok(n.get() as u64)
}

pub fn detect_memory_gb() -> anyhow::Result<u64> {
    let text = std::fs::read_to_string("/proc/meminfo")
        .context("cannot read /proc/meminfo; set host.memory_gb in the config")?;
    match parse_meminfo_gb(&text) {
        Some(gb) => Ok(gb),
        None => bail!("no MemTotal in /proc/meminfo; set host.memory_gb in the config"),
    }
}

/// Whole GiB of `MemTotal` from `/proc/meminfo` text (reported in kB).
pub fn parse_meminfo_gb(text: &str) -> Option<u64> {
    let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mem_total() {
        let text = "MemTotal:       65843812 kB\nMemFree:         1234 kB\n";
        assert_eq!(parse_meminfo_gb(text), Some(62));
        assert_eq!(parse_meminfo_gb("MemFree: 1 kB\n"), None);
    }

    #[test]
    fn config_overrides_detection() {
        let config = FleetConfig::scaffold(12, 48);
        assert_eq!(
            HostResources::resolve(&config).unwrap(),
            HostResources { threads: 12, memory_gb: 48 }
        );
    }
}
