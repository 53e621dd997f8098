//! Advisory reference-height feeds.
//!
//! A feed is a second opinion on the chain tip. It is shown next to the
//! fleet reference for the operator and never replaces it.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use fleet_core::Height;

static SNAPSHOT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:[.,_]\d{3})+|\d+)\.(?:jam|snapshot)$").expect("valid regex")
});

/// A source of an external chain height.
pub trait HeightFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Latest height the feed knows, if any.
    fn latest(&self) -> Option<Height>;
}

/// A directory of exported state snapshots whose file names end in the
/// height they were taken at, e.g. `state-1.234.567.jam`.
#[derive(Debug, Clone)]
pub struct SnapshotDirFeed {
    dir: PathBuf,
}

impl SnapshotDirFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Height encoded in a snapshot file name.
pub fn snapshot_height(file_name: &str) -> Option<Height> {
    SNAPSHOT_NAME_RE
        .captures(file_name)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

impl HeightFeed for SnapshotDirFeed {
    fn name(&self) -> &str {
        "snapshot-dir"
    }

    fn latest(&self) -> Option<Height> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = ?self.dir, error = %e, "snapshot feed unreadable");
                return None;
            }
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| snapshot_height(&entry.file_name().to_string_lossy()))
            .max()
    }
}

/// The fleet reference next to an external opinion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub source: String,
    pub external: Option<Height>,
    pub fleet: Option<Height>,
    /// `external - fleet`; positive when the fleet is behind the feed.
    pub delta: Option<i64>,
}

impl Advisory {
    pub fn compare(feed: &dyn HeightFeed, fleet: Option<Height>) -> Self {
        let external = feed.latest();
        let delta = match (external, fleet) {
            (Some(e), Some(f)) => Some(e.get() as i64 - f.get() as i64),
            _ => None,
        };
        Self {
            source: feed.name().to_string(),
            external,
            fleet,
            delta,
        }
    }
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |h: Option<Height>| h.map(|h| h.to_string()).unwrap_or_else(|| "--".into());
        write!(
            f,
            "advisory [{}]: external {} / fleet {}",
            self.source,
            show(self.external),
            show(self.fleet)
        )?;
        if let Some(delta) = self.delta {
            write!(f, " (delta {delta:+})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<Height>);

    impl HeightFeed for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn latest(&self) -> Option<Height> {
            self.0
        }
    }

    #[test]
    fn snapshot_names() {
        assert_eq!(snapshot_height("state-1.234.567.jam"), Some(Height(1_234_567)));
        assert_eq!(snapshot_height("v2-snapshot-9000.jam"), Some(Height(9_000)));
        assert_eq!(snapshot_height("chain_42.snapshot"), Some(Height(42)));
        assert_eq!(snapshot_height("state.jam"), None);
        assert_eq!(snapshot_height("state-12.tar"), None);
    }

    #[test]
    fn dir_feed_takes_numeric_max() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["state-999.jam", "state-1.000.jam", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let feed = SnapshotDirFeed::new(dir.path());
        assert_eq!(feed.latest(), Some(Height(1_000)));
    }

    #[test]
    fn missing_dir_is_unknown() {
        assert_eq!(SnapshotDirFeed::new("/nonexistent/minerfleet/snaps").latest(), None);
    }

    #[test]
    fn advisory_delta_is_signed() {
        let a = Advisory::compare(&Fixed(Some(Height(90))), Some(Height(100)));
        assert_eq!(a.delta, Some(-10));
        assert_eq!(a.to_string(), "advisory [fixed]: external 90 / fleet 100 (delta -10)");

        let b = Advisory::compare(&Fixed(None), Some(Height(100)));
        assert_eq!(b.delta, None);
        assert_eq!(b.to_string(), "advisory [fixed]: external -- / fleet 100");
    }
}
