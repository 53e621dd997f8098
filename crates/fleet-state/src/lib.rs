//! fleet-state — per-worker metric store for minerfleet.
//!
//! Backed by [redb](https://docs.rs/redb), keeps three derived series per
//! worker (validated blocks, finished proofs, proof attempts) as
//! append-only, deduplicated, retention-bounded tables.
//!
//! # Architecture
//!
//! Rows are JSON-serialized into redb's `&[u8]` value columns. Keys are
//! `{worker}:{sort key}` with zero-padded numbers, so a worker's rows are
//! one contiguous range already in numeric order and the key itself is
//! the dedup key.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across the tick loop's blocking tasks. Callers that
//! want another backend implement [`SeriesStore`].

pub mod csv;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use csv::{CsvRecord, import_csv, parse_csv, to_csv};
pub use error::{StateError, StateResult};
pub use store::{SeriesStore, StateStore};
pub use types::*;
