//! Stored cache entry envelope.

use serde::{Deserialize, Serialize};

/// A cached payload with its write time and serialized size.
///
/// `size` is the compact-JSON byte length of `data` at write time. Entries are
/// never mutated in place; a new write replaces the whole envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Write time, epoch milliseconds
    pub timestamp: i64,
    pub size: u64,
}

/// Envelope fields only; lets the sweep check expiry without decoding payloads.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct EntryHeader {
    pub timestamp: i64,
}
