//! Log source adapter — bounded reads over an append-only worker log.
//!
//! Reads are always bounded: the tail is capped at a byte budget and
//! correlation windows at twice their radius. Byte offsets are kept
//! exact (lines are split on raw bytes before lossy UTF-8 decoding) so a
//! later window read lands where the line was.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime};

use crate::error::{TelemetryError, TelemetryResult};

/// One line of a worker log and where it starts in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub offset: u64,
    pub text: String,
}

/// A worker's event stream: read-only, tailable, seekable.
pub trait LogSource: Send + Sync {
    /// The complete lines within the last `max_bytes` of the stream,
    /// oldest first.
    fn tail(&self, max_bytes: u64) -> TelemetryResult<Vec<LogLine>>;

    /// Raw text from `center - radius` to `center + radius`, clamped to
    /// the stream. The second value is `center`'s index into the text.
    fn window(&self, center: u64, radius: u64) -> TelemetryResult<(String, usize)>;

    /// Local time of the stream's last write, when known. Every line is
    /// at or before it.
    fn last_write(&self) -> Option<NaiveDateTime> {
        None
    }
}

/// A log file on disk.
#[derive(Debug, Clone)]
pub struct FileLogSource {
    path: PathBuf,
}

impl FileLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn unavailable(&self, source: std::io::Error) -> TelemetryError {
        TelemetryError::SourceUnavailable {
            path: self.path.clone(),
            source,
        }
    }

    fn read_range(&self, start: u64, len: u64) -> TelemetryResult<Vec<u8>> {
        let mut file = File::open(&self.path).map_err(|e| self.unavailable(e))?;
        file.seek(SeekFrom::Start(start))
            .map_err(|e| self.unavailable(e))?;
        let mut buf = Vec::with_capacity(len as usize);
        file.take(len)
            .read_to_end(&mut buf)
            .map_err(|e| self.unavailable(e))?;
        Ok(buf)
    }

    fn file_len(&self) -> TelemetryResult<u64> {
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| self.unavailable(e))
    }
}

impl LogSource for FileLogSource {
    fn tail(&self, max_bytes: u64) -> TelemetryResult<Vec<LogLine>> {
        let len = self.file_len()?;
        let start = len.saturating_sub(max_bytes);
        let buf = self.read_range(start, len - start)?;
        Ok(split_lines(&buf, start, start > 0))
    }

    fn window(&self, center: u64, radius: u64) -> TelemetryResult<(String, usize)> {
        let len = self.file_len()?;
        let center = center.min(len);
        let start = center.saturating_sub(radius);
        let end = center.saturating_add(radius).min(len);
        let buf = self.read_range(start, end - start)?;
        // Lossy decoding can only grow the text; the center index is
        // approximate when the window holds invalid UTF-8.
        Ok((
            String::from_utf8_lossy(&buf).into_owned(),
            (center - start) as usize,
        ))
    }

    fn last_write(&self) -> Option<NaiveDateTime> {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Local>::from(modified).naive_local())
    }
}

/// Split raw bytes into non-empty lines, dropping the first fragment when
/// the read began mid-line.
fn split_lines(buf: &[u8], base: u64, skip_partial_first: bool) -> Vec<LogLine> {
    let mut lines = Vec::new();
    let mut pos = 0usize;

    if skip_partial_first {
        match buf.iter().position(|&b| b == b'\n') {
            Some(nl) => pos = nl + 1,
            None => return lines,
        }
    }

    for chunk in buf[pos..].split(|&b| b == b'\n') {
        let offset = base + pos as u64;
        pos += chunk.len() + 1;
        let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
        if chunk.is_empty() {
            continue;
        }
        lines.push(LogLine {
            offset,
            text: String::from_utf8_lossy(chunk).into_owned(),
        });
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use chrono::TimeZone;

    fn write_log(content: &str) -> (tempfile::TempDir, FileLogSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner2.log");
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, FileLogSource::new(path))
    }

    #[test]
    fn tail_reads_all_lines_with_offsets() {
        let (_dir, source) = write_log("alpha\nbeta\r\n\ngamma\n");
        let lines = source.tail(1024).unwrap();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta", "gamma"]);
        assert_eq!(lines[0].offset, 0);
        assert_eq!(lines[1].offset, 6);
        assert_eq!(lines[2].offset, 13);
    }

    #[test]
    fn tail_drops_partial_first_line() {
        let (_dir, source) = write_log("first line\nsecond\nthird\n");
        // The last 12 bytes begin inside "second".
        let lines = source.tail(12).unwrap();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["third"]);
        assert_eq!(lines[0].offset, 18);
    }

    #[test]
    fn tail_keeps_unterminated_last_line() {
        let (_dir, source) = write_log("one\ntwo");
        let lines = source.tail(1024).unwrap();
        assert_eq!(lines.last().unwrap().text, "two");
    }

    #[test]
    fn window_is_clamped_to_file() {
        let (_dir, source) = write_log("0123456789");
        let (text, center) = source.window(2, 5).unwrap();
        assert_eq!(text, "0123456");
        assert_eq!(center, 2);
        let (text, center) = source.window(8, 5).unwrap();
        assert_eq!(text, "3456789");
        assert_eq!(center, 5);
    }

    #[test]
    fn last_write_follows_file_mtime() {
        let (_dir, source) = write_log("one\n");
        let at = chrono::NaiveDate::from_ymd_opt(2026, 3, 13)
            .unwrap()
            .and_hms_opt(12, 0, 5)
            .unwrap();
        let mtime: std::time::SystemTime = Local.from_local_datetime(&at).single().unwrap().into();
        File::options()
            .write(true)
            .open(&source.path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        assert_eq!(source.last_write(), Some(at));
        assert_eq!(FileLogSource::new("/nonexistent/miner9.log").last_write(), None);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let source = FileLogSource::new("/nonexistent/minerfleet/miner9.log");
        assert!(matches!(
            source.tail(1024),
            Err(TelemetryError::SourceUnavailable { .. })
        ));
    }
}
