//! Shared types used across minerfleet crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier for a worker, unique within the fleet. Worker 1 is the
/// tracking worker by convention.
pub type WorkerId = u32;

/// The id reserved for the tracking worker.
pub const TRACKING_WORKER: WorkerId = 1;

// ── Height ─────────────────────────────────────────────────────────

/// A chain height as reported by a worker's log.
///
/// Logs print heights grouped in thousands (`1.234.567`, `1,234,567`);
/// parsing strips the grouping so comparisons are always numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Height(pub u64);

impl Height {
    pub fn get(self) -> u64 {
        self.0
    }

    /// Blocks this height trails `reference` by, clamped at zero.
    pub fn lag_behind(self, reference: Height) -> u64 {
        reference.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a height token contains no digits or overflows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid height: {0:?}")]
pub struct InvalidHeight(pub String);

impl FromStr for Height {
    type Err = InvalidHeight;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidHeight(s.to_string());
        let groups: Vec<&str> = s
            .trim()
            .split(|c| matches!(c, '.' | ',' | '_' | '\'' | ' '))
            .collect();
        // Either one run of digits, or 1-3 leading digits followed by
        // groups of exactly three.
        let grouped = match groups.as_slice() {
            [single] => !single.is_empty(),
            [first, rest @ ..] => {
                (1..=3).contains(&first.len()) && rest.iter().all(|g| g.len() == 3)
            }
            [] => false,
        };
        if !grouped || !groups.iter().all(|g| g.bytes().all(|b| b.is_ascii_digit())) {
            return Err(invalid());
        }
        groups.concat().parse::<u64>().map(Height).map_err(|_| invalid())
    }
}

// ── Roles and tiers ────────────────────────────────────────────────

/// What a worker does in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Stays synchronized, never mines.
    Tracking,
    /// Synchronizes and mines.
    Producing,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Tracking => "tracking",
            Role::Producing => "producing",
        }
    }

    pub fn mines(&self) -> bool {
        matches!(self, Role::Producing)
    }
}

/// One rung of the discrete memory ladder a producing worker can be given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Tiny,
    Small,
    Normal,
    Medium,
    Large,
    Huge,
}

impl MemoryTier {
    /// The ladder, largest first.
    pub const LADDER: [MemoryTier; 6] = [
        MemoryTier::Huge,
        MemoryTier::Large,
        MemoryTier::Medium,
        MemoryTier::Normal,
        MemoryTier::Small,
        MemoryTier::Tiny,
    ];

    /// Memory this tier reserves, in GB.
    pub fn gb(&self) -> u64 {
        match self {
            MemoryTier::Huge => 64,
            MemoryTier::Large => 32,
            MemoryTier::Medium => 16,
            MemoryTier::Normal => 8,
            MemoryTier::Small => 4,
            MemoryTier::Tiny => 2,
        }
    }

    /// Name as passed to the worker's `--stack-size` flag.
    pub fn flag(&self) -> &'static str {
        match self {
            MemoryTier::Huge => "huge",
            MemoryTier::Large => "large",
            MemoryTier::Medium => "medium",
            MemoryTier::Normal => "normal",
            MemoryTier::Small => "small",
            MemoryTier::Tiny => "tiny",
        }
    }

    /// Largest tier that fits in `memory_gb`, if any.
    pub fn largest_fitting(memory_gb: u64) -> Option<MemoryTier> {
        Self::LADDER.into_iter().find(|t| t.gb() <= memory_gb)
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

impl FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huge" => Ok(MemoryTier::Huge),
            "large" => Ok(MemoryTier::Large),
            "medium" => Ok(MemoryTier::Medium),
            "normal" => Ok(MemoryTier::Normal),
            "small" => Ok(MemoryTier::Small),
            "tiny" => Ok(MemoryTier::Tiny),
            other => Err(format!("unknown memory tier: {other}")),
        }
    }
}

// ── Modes ──────────────────────────────────────────────────────────

/// How the planner partitions the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    #[default]
    Recommended,
    Custom,
}

/// How workers are told about each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyMode {
    #[default]
    None,
    Central,
    Mesh,
    Custom,
}

impl FromStr for TopologyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(TopologyMode::None),
            "central" => Ok(TopologyMode::Central),
            "mesh" => Ok(TopologyMode::Mesh),
            "custom" => Ok(TopologyMode::Custom),
            other => Err(format!("unknown topology mode: {other}")),
        }
    }
}
