//! Pairing a finished proof with the `mining-on` line that started it.

use chrono::NaiveTime;

use fleet_core::Height;

use crate::extract::{MINING_ON_MARKER, mining_on_time};
use crate::source::LogLine;

/// Search the in-memory tail around line `finish_idx` for the start of
/// the proof at `height`. The nearest preceding line wins; following
/// lines are checked only when nothing precedes it, since the stream is
/// not strictly ordered.
pub fn start_in_tail(lines: &[LogLine], finish_idx: usize, height: Height) -> Option<NaiveTime> {
    let finish_idx = finish_idx.min(lines.len());
    lines[..finish_idx]
        .iter()
        .rev()
        .find_map(|l| mining_on_time(&l.text, height))
        .or_else(|| {
            lines
                .get(finish_idx + 1..)
                .unwrap_or_default()
                .iter()
                .find_map(|l| mining_on_time(&l.text, height))
        })
}

/// Search a raw window of log text for the `mining-on` line for `height`
/// closest to byte `center`.
pub fn start_in_window(text: &str, center: usize, height: Height) -> Option<NaiveTime> {
    let mut best: Option<(usize, NaiveTime)> = None;
    let mut line_start = 0usize;
    for line in text.split('\n') {
        let distance = line_start.abs_diff(center);
        line_start += line.len() + 1;
        if !line.contains(MINING_ON_MARKER) {
            continue;
        }
        let Some(time) = mining_on_time(line, height) else {
            continue;
        };
        if best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, time));
        }
    }
    best.map(|(_, t)| t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<LogLine> {
        let mut offset = 0;
        texts
            .iter()
            .map(|t| {
                let line = LogLine { offset, text: t.to_string() };
                offset += t.len() as u64 + 1;
                line
            })
            .collect()
    }

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn nearest_preceding_start_wins() {
        let tail = lines(&[
            "I (10:00:00) mining-on block 500",
            "I (10:00:05) mining-on block 501",
            "I (10:01:00) mining-on block 500",
            "I (10:02:00) finished-proof block 500",
        ]);
        assert_eq!(start_in_tail(&tail, 3, Height(500)), Some(t(10, 1, 0)));
    }

    #[test]
    fn following_start_is_a_fallback() {
        let tail = lines(&[
            "I (10:02:00) finished-proof block 500",
            "I (10:01:00) mining-on block 500",
        ]);
        assert_eq!(start_in_tail(&tail, 0, Height(500)), Some(t(10, 1, 0)));
    }

    #[test]
    fn absent_start_is_none() {
        let tail = lines(&["I (10:02:00) finished-proof block 500"]);
        assert_eq!(start_in_tail(&tail, 0, Height(500)), None);
        assert_eq!(start_in_tail(&[], 0, Height(500)), None);
    }

    #[test]
    fn window_picks_line_closest_to_center() {
        let text = "I (09:00:00) mining-on block 7\nnoise noise noise\nI (09:30:00) mining-on block 7\nI (09:31:00) finished-proof block 7\n";
        let center = text.find("finished-proof").unwrap();
        assert_eq!(start_in_window(text, center, Height(7)), Some(t(9, 30, 0)));
        assert_eq!(start_in_window(text, center, Height(8)), None);
    }
}
