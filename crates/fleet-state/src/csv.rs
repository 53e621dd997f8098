//! Delimited text format for exported series.
//!
//! One header line, then one comma-separated record per row. Every field
//! is numeric (an unknown proof start is an empty field), so no quoting
//! or escaping is needed.

use fleet_core::{Height, WorkerId};

use crate::error::{StateError, StateResult};
use crate::store::SeriesStore;
use crate::types::{AttemptRow, BlockRow, ProofRow, SeriesRow};

/// A row with a fixed CSV layout.
pub trait CsvRecord: SeriesRow {
    const HEADER: &'static str;

    fn to_record(&self) -> String;

    fn from_record(fields: &[&str]) -> Result<Self, String>;
}

fn field<T: std::str::FromStr>(fields: &[&str], idx: usize, name: &str) -> Result<T, String> {
    let raw = fields
        .get(idx)
        .ok_or_else(|| format!("missing field {name}"))?;
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid {name}: {raw:?}"))
}

fn expect_arity(fields: &[&str], n: usize) -> Result<(), String> {
    if fields.len() == n {
        Ok(())
    } else {
        Err(format!("expected {n} fields, found {}", fields.len()))
    }
}

impl CsvRecord for BlockRow {
    const HEADER: &'static str = "worker_id,height,at";

    fn to_record(&self) -> String {
        format!("{},{},{}", self.worker_id, self.height, self.at)
    }

    fn from_record(fields: &[&str]) -> Result<Self, String> {
        expect_arity(fields, 3)?;
        Ok(BlockRow {
            worker_id: field::<WorkerId>(fields, 0, "worker_id")?,
            height: field::<Height>(fields, 1, "height")?,
            at: field(fields, 2, "at")?,
        })
    }
}

impl CsvRecord for ProofRow {
    const HEADER: &'static str = "worker_id,height,finished_at,started_at";

    fn to_record(&self) -> String {
        let started = self.started_at.map(|s| s.to_string()).unwrap_or_default();
        format!("{},{},{},{}", self.worker_id, self.height, self.finished_at, started)
    }

    fn from_record(fields: &[&str]) -> Result<Self, String> {
        expect_arity(fields, 4)?;
        let started_at = match fields[3].trim() {
            "" => None,
            _ => Some(field(fields, 3, "started_at")?),
        };
        Ok(ProofRow {
            worker_id: field(fields, 0, "worker_id")?,
            height: field(fields, 1, "height")?,
            finished_at: field(fields, 2, "finished_at")?,
            started_at,
        })
    }
}

impl CsvRecord for AttemptRow {
    const HEADER: &'static str = "worker_id,at";

    fn to_record(&self) -> String {
        format!("{},{}", self.worker_id, self.at)
    }

    fn from_record(fields: &[&str]) -> Result<Self, String> {
        expect_arity(fields, 2)?;
        Ok(AttemptRow {
            worker_id: field(fields, 0, "worker_id")?,
            at: field(fields, 1, "at")?,
        })
    }
}

/// Render rows with a header line.
pub fn to_csv<R: CsvRecord>(rows: &[R]) -> String {
    let mut out = String::with_capacity(rows.len() * 32 + R::HEADER.len() + 1);
    out.push_str(R::HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_record());
        out.push('\n');
    }
    out
}

/// Parse rows, requiring the exact header on the first line.
pub fn parse_csv<R: CsvRecord>(text: &str) -> StateResult<Vec<R>> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    match lines.next() {
        Some((_, header)) if header.trim() == R::HEADER => {}
        Some((idx, header)) => {
            return Err(StateError::Csv {
                line: idx + 1,
                reason: format!("unexpected header {header:?}, want {:?}", R::HEADER),
            });
        }
        None => return Ok(Vec::new()),
    }
    lines
        .map(|(idx, line)| {
            let fields: Vec<&str> = line.split(',').collect();
            R::from_record(&fields).map_err(|reason| StateError::Csv { line: idx + 1, reason })
        })
        .collect()
}

/// Load an exported file back into a store, honoring dedup and retention.
pub fn import_csv<R: CsvRecord, S: SeriesStore>(
    store: &S,
    text: &str,
    retention: usize,
) -> StateResult<usize> {
    let rows: Vec<R> = parse_csv(text)?;
    store.append(&rows, retention)
}
