//! Event extraction — the only place raw log text is interpreted.
//!
//! Every function here is pure and total: a line that matches nothing
//! yields `None`. Terminal styling is stripped before any matching.

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

use fleet_core::Height;

pub const VALIDATED_MARKER: &str = "added to validated blocks";
pub const HEARD_MARKER: &str = "heard block";
pub const ATTEMPT_MARKER: &str = "starting proving attempt";
pub const FINISHED_MARKER: &str = "finished-proof";
pub const MINING_ON_MARKER: &str = "mining-on";

/// A height as printed, with optional thousands grouping.
const GROUPED: &str = r"\d{1,3}(?:[.,_]\d{3})+|\d+";

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[@-Z\\-_])")
        .expect("valid regex")
});
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{1,2}):(\d{2}):(\d{2})\)").expect("valid regex"));
static GROUPED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(GROUPED).expect("valid regex"));
static AT_HEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\bat\s+({GROUPED})")).expect("valid regex"));
static HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\bheight\s*[:=]?\s*({GROUPED})")).expect("valid regex")
});
static PROOF_HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:height|block)\s*[:=#]?\s*({GROUPED})")).expect("valid regex")
});
static PEERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:connected\s+peers|peer\s+count|peers)\s*[:=]?\s*(\d+)\b")
        .expect("valid regex")
});
static ATTEMPT_EXCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)sync|inactive").expect("valid regex"));

/// A typed event recovered from one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BlockValidated { height: Height, time: NaiveTime },
    BlockHeard { height: Height, time: Option<NaiveTime> },
    ProofAttemptStarted { time: NaiveTime },
    ProofFinished { height: Height, time: NaiveTime },
    PeerCountSample { count: u32 },
}

/// Which kind of line a series is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BlockValidated,
    BlockHeard,
    ProofAttemptStarted,
    ProofFinished,
    PeerCountSample,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BlockValidated { .. } => EventKind::BlockValidated,
            Event::BlockHeard { .. } => EventKind::BlockHeard,
            Event::ProofAttemptStarted { .. } => EventKind::ProofAttemptStarted,
            Event::ProofFinished { .. } => EventKind::ProofFinished,
            Event::PeerCountSample { .. } => EventKind::PeerCountSample,
        }
    }

    pub fn height(&self) -> Option<Height> {
        match self {
            Event::BlockValidated { height, .. }
            | Event::BlockHeard { height, .. }
            | Event::ProofFinished { height, .. } => Some(*height),
            _ => None,
        }
    }
}

impl EventKind {
    /// Cheap pre-filter: could this raw line produce an event of this kind?
    ///
    /// Used to find candidate lines from the end of a tail without running
    /// the full extractor on every line.
    pub fn may_match(&self, raw: &str) -> bool {
        let text = strip_control(raw);
        match self {
            EventKind::BlockValidated => text.contains(VALIDATED_MARKER),
            EventKind::BlockHeard => text.contains(HEARD_MARKER),
            EventKind::ProofAttemptStarted => text.contains(ATTEMPT_MARKER),
            EventKind::ProofFinished => text.contains(FINISHED_MARKER),
            EventKind::PeerCountSample => PEERS_RE.is_match(&text),
        }
    }
}

/// Remove ANSI escape sequences and other control characters (tabs stay).
pub fn strip_control(line: &str) -> Cow<'_, str> {
    if !line.chars().any(|c| c.is_control() && c != '\t') {
        return Cow::Borrowed(line);
    }
    let without_ansi = ANSI_RE.replace_all(line, "");
    Cow::Owned(
        without_ansi
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect(),
    )
}

/// Map one raw line to at most one event.
pub fn extract(line: &str) -> Option<Event> {
    let clean = strip_control(line);
    let text = clean.as_ref();

    if let Some(pos) = text.find(VALIDATED_MARKER) {
        let time = nearest_time(text, pos)?;
        let height = first_height(&AT_HEIGHT_RE, &text[pos..])?;
        return Some(Event::BlockValidated { height, time });
    }

    if let Some(pos) = text.find(HEARD_MARKER) {
        let height = first_height(&HEIGHT_RE, &text[pos..])
            .or_else(|| first_height(&HEIGHT_RE, text))?;
        return Some(Event::BlockHeard {
            height,
            time: nearest_time(text, pos),
        });
    }

    if let Some(pos) = text.find(FINISHED_MARKER) {
        let time = nearest_time(text, pos)?;
        let height = first_height(&PROOF_HEIGHT_RE, &text[pos..])
            .or_else(|| first_height(&PROOF_HEIGHT_RE, text))?;
        return Some(Event::ProofFinished { height, time });
    }

    if let Some(pos) = text.find(ATTEMPT_MARKER) {
        if ATTEMPT_EXCLUDE_RE.is_match(text) {
            return None;
        }
        let time = nearest_time(text, pos)?;
        return Some(Event::ProofAttemptStarted { time });
    }

    let caps = PEERS_RE.captures(text)?;
    let count = caps.get(1)?.as_str().parse().ok()?;
    Some(Event::PeerCountSample { count })
}

/// Time of a `mining-on` line announcing work on `height`.
///
/// This is the start half of a proof; the matching `finished-proof` line
/// may be far away in the stream.
pub fn mining_on_time(line: &str, height: Height) -> Option<NaiveTime> {
    let clean = strip_control(line);
    let text = clean.as_ref();
    let pos = text.find(MINING_ON_MARKER)?;
    let after = pos + MINING_ON_MARKER.len();
    let mentions_height = height_tokens(text)
        .any(|(start, h)| start >= after && h == height);
    if !mentions_height {
        return None;
    }
    nearest_time(text, pos)
}

/// Byte index in `raw` of a printed height equal to `height`.
pub fn locate_height(raw: &str, height: Height) -> Option<usize> {
    height_tokens(raw)
        .find(|&(_, h)| h == height)
        .map(|(start, _)| start)
}

/// Every height-shaped token outside the `(HH:MM:SS)` stamps, with its
/// byte index.
fn height_tokens(text: &str) -> impl Iterator<Item = (usize, Height)> + '_ {
    let stamps: Vec<(usize, usize)> = TIME_RE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    GROUPED_RE
        .find_iter(text)
        .filter(move |m| !stamps.iter().any(|&(s, e)| m.start() < e && s < m.end()))
        .filter_map(|m| Some((m.start(), m.as_str().parse::<Height>().ok()?)))
}

/// The `(HH:MM:SS)` token closest to byte `pos`.
fn nearest_time(text: &str, pos: usize) -> Option<NaiveTime> {
    TIME_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let h = caps.get(1)?.as_str().parse().ok()?;
            let m = caps.get(2)?.as_str().parse().ok()?;
            let s = caps.get(3)?.as_str().parse().ok()?;
            NaiveTime::from_hms_opt(h, m, s).map(|t| (start.abs_diff(pos), t))
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, t)| t)
}

fn first_height(re: &Regex, text: &str) -> Option<Height> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn validated_block_with_grouped_height() {
        let line = "I (14:02:11) [nc] block ABC added to validated blocks at 1.234.567 (14:02:11) ok";
        assert_eq!(
            extract(line),
            Some(Event::BlockValidated { height: Height(1_234_567), time: t(14, 2, 11) })
        );
    }

    #[test]
    fn validated_block_through_ansi_styling() {
        let line = "\x1b[32mI\x1b[0m (09:00:01) added to validated blocks at \x1b[1m12,345\x1b[0m";
        assert_eq!(
            extract(line),
            Some(Event::BlockValidated { height: Height(12_345), time: t(9, 0, 1) })
        );
    }

    #[test]
    fn validated_block_without_time_is_a_miss() {
        assert_eq!(extract("added to validated blocks at 100"), None);
    }

    #[test]
    fn heard_block_time_is_optional() {
        assert_eq!(
            extract("heard block 8sd2k at height 45.001"),
            Some(Event::BlockHeard { height: Height(45_001), time: None })
        );
        assert_eq!(
            extract("I (10:00:00) heard block xyz height: 7"),
            Some(Event::BlockHeard { height: Height(7), time: Some(t(10, 0, 0)) })
        );
    }

    #[test]
    fn proving_attempt_respects_exclusion_filter() {
        assert_eq!(
            extract("I (11:11:11) starting proving attempt"),
            Some(Event::ProofAttemptStarted { time: t(11, 11, 11) })
        );
        assert_eq!(extract("I (11:11:11) starting proving attempt while SYNCING"), None);
        assert_eq!(extract("I (11:11:11) starting proving attempt: inactive"), None);
    }

    #[test]
    fn finished_proof() {
        assert_eq!(
            extract("I (12:00:30) finished-proof for block 9.001"),
            Some(Event::ProofFinished { height: Height(9_001), time: t(12, 0, 30) })
        );
    }

    #[test]
    fn peer_count_sample() {
        assert_eq!(
            extract("I (12:00:30) connected peers: 17"),
            Some(Event::PeerCountSample { count: 17 })
        );
        assert!(EventKind::PeerCountSample.may_match("peers=4"));
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("I (12:00:30) kernel booted"), None);
        assert_eq!(extract("\x1b[2K\r"), None);
    }

    #[test]
    fn nearest_time_token_wins() {
        let line = "(01:00:00) padding padding padding padding added to validated blocks at 5 (02:00:00)";
        assert_eq!(
            extract(line),
            Some(Event::BlockValidated { height: Height(5), time: t(2, 0, 0) })
        );
    }

    #[test]
    fn mining_on_matches_only_its_height() {
        let line = "I (13:00:00) mining-on block 1.000.200";
        assert_eq!(mining_on_time(line, Height(1_000_200)), Some(t(13, 0, 0)));
        assert_eq!(mining_on_time(line, Height(1_000_201)), None);
        assert_eq!(mining_on_time("I (13:00:00) finished-proof 1.000.200", Height(1_000_200)), None);
    }

    #[test]
    fn mining_on_ignores_digits_of_the_stamp() {
        assert_eq!(mining_on_time("I (09:00:00) mining-on block 12", Height(9)), None);
        assert_eq!(mining_on_time("I (09:00:00) mining-on block 12", Height(0)), None);
        assert_eq!(mining_on_time("I (13:00:00) mining-on block 9", Height(9)), Some(t(13, 0, 0)));
        assert_eq!(locate_height("I (09:00:05) finished-proof block 9", Height(9)), Some(34));
    }

    #[test]
    fn locate_height_finds_token_offset() {
        assert_eq!(locate_height("finished-proof block 1,002", Height(1002)), Some(21));
        assert_eq!(locate_height("nothing here", Height(1)), None);
    }

    #[test]
    fn strip_control_borrows_clean_lines() {
        assert!(matches!(strip_control("plain\ttext"), Cow::Borrowed(_)));
        assert_eq!(strip_control("\x1b]0;title\x07ok"), "ok");
    }
}
