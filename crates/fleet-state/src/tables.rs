//! redb table definitions for the metric store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized rows).
//! Keys are `{worker:010}:{sort key}` where every numeric component is
//! zero-padded, so byte order equals numeric order and a worker's rows
//! form one contiguous range.

use redb::TableDefinition;

/// Validated blocks keyed by `{worker}:{height}:{at}`.
pub const BLOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("blocks");

/// Finished proofs keyed by `{worker}:{finished_at}:{height}`.
pub const PROOFS: TableDefinition<&str, &[u8]> = TableDefinition::new("proofs");

/// Proof attempts keyed by `{worker}:{at}`.
pub const ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("attempts");
