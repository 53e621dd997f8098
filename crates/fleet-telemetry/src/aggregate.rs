//! Fleet height aggregation.
//!
//! A worker's height comes from the most recent heights it printed, not
//! from the store: heard-block lines track the network while validated
//! lines track the worker's own chain, and the larger of the two is what
//! the worker knows about. The fleet reference is the largest worker
//! height. Nothing here is cached; every tick recomputes from the tail.

use fleet_core::Height;

use crate::extract::{Event, EventKind, extract};
use crate::source::LogLine;

/// How many of the newest lines of each kind are considered.
pub const HEIGHT_LOOKBACK: usize = 5;

/// Highest height among the last few heard and validated lines.
pub fn worker_height(lines: &[LogLine]) -> Option<Height> {
    let heard = newest_heights(lines, EventKind::BlockHeard);
    let validated = newest_heights(lines, EventKind::BlockValidated);
    heard.max(validated)
}

fn newest_heights(lines: &[LogLine], kind: EventKind) -> Option<Height> {
    lines
        .iter()
        .rev()
        .filter(|l| kind.may_match(&l.text))
        .filter_map(|l| extract(&l.text))
        .filter(|e| e.kind() == kind)
        .take(HEIGHT_LOOKBACK)
        .filter_map(|e: Event| e.height())
        .max()
}

/// Fleet reference: the numeric max over all known worker heights.
pub fn reference_height<I>(heights: I) -> Option<Height>
where
    I: IntoIterator<Item = Option<Height>>,
{
    heights.into_iter().flatten().max()
}

/// Blocks a worker trails the reference by; unknown if either side is.
pub fn lag(reference: Option<Height>, worker: Option<Height>) -> Option<u64> {
    Some(worker?.lag_behind(reference?))
}
