//! fleet-telemetry — from worker log text to stored, aggregated series.
//!
//! # Pipeline
//!
//! ```text
//! LogSource::tail ─▶ extract ─▶ Ingestor (bulk | incremental) ─▶ SeriesStore
//!        │                                                        │
//!        └──────▶ aggregate::worker_height           WorkerMetrics::read
//! ```
//!
//! [`extract`] is the only module that interprets raw text. Everything
//! after it works on typed [`Event`]s and anchored epoch seconds.

pub mod aggregate;
pub mod clock;
pub mod correlate;
pub mod error;
pub mod extract;
pub mod feed;
pub mod ingest;
pub mod source;
pub mod stats;

pub use aggregate::{lag, reference_height, worker_height};
pub use error::{TelemetryError, TelemetryResult};
pub use extract::{Event, EventKind, extract};
pub use feed::{Advisory, HeightFeed, SnapshotDirFeed};
pub use ingest::{IngestMode, IngestSettings, Ingestor, SeriesUpdate, WorkerUpdate};
pub use source::{FileLogSource, LogLine, LogSource};
pub use stats::{WorkerMetrics, mean_positive_interval};
