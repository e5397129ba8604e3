//! In-memory mirror of what a cache domain holds.
//!
//! The metadata is the source of truth for which entries are supposed to
//! exist. It is persisted to the `metadata` partition after every mutation
//! (or once at the end of a deferred bulk operation).

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Tracked keys in insertion order
    pub keys: IndexSet<String>,
    /// Sum of `sizes` over all tracked keys
    pub total_size: u64,
    /// Last read or write per key, epoch milliseconds
    pub last_accessed: HashMap<String, i64>,
    /// Serialized size per key
    #[serde(default)]
    pub sizes: HashMap<String, u64>,
    /// Keys with a store write in progress (never persisted)
    #[serde(skip)]
    in_flight: HashMap<String, u32>,
}

impl CacheMetadata {
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn entry_count(&self) -> usize {
        self.keys.len()
    }

    /// Track a freshly written entry, replacing any previous record for the key.
    pub fn record(&mut self, key: &str, size: u64, now: i64) {
        self.forget(key);
        self.keys.insert(key.to_string());
        self.sizes.insert(key.to_string(), size);
        self.last_accessed.insert(key.to_string(), now);
        self.total_size += size;
    }

    /// Refresh last access. Returns false if the key is not tracked.
    pub fn touch(&mut self, key: &str, now: i64) -> bool {
        if !self.keys.contains(key) {
            return false;
        }
        self.last_accessed.insert(key.to_string(), now);
        true
    }

    /// Stop tracking a key, returning the bytes it accounted for.
    pub fn forget(&mut self, key: &str) -> Option<u64> {
        if !self.keys.shift_remove(key) {
            return None;
        }
        self.last_accessed.remove(key);
        let size = self.sizes.remove(key).unwrap_or(0);
        self.total_size = self.total_size.saturating_sub(size);
        Some(size)
    }

    /// Drop every tracked key. In-flight markers survive so pending writers
    /// can notice their key was cleared underneath them.
    pub fn reset(&mut self) {
        self.keys.clear();
        self.last_accessed.clear();
        self.sizes.clear();
        self.total_size = 0;
    }

    pub fn begin_write(&mut self, key: &str) {
        *self.in_flight.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn end_write(&mut self, key: &str) {
        if let Some(count) = self.in_flight.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(key);
            }
        }
    }

    pub fn is_writing(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Bring loaded metadata back to a consistent state.
    ///
    /// Drops bookkeeping for untracked keys and recomputes `total_size` when
    /// every key has a known size.
    pub fn repair(&mut self) {
        let keys = &self.keys;
        self.last_accessed.retain(|k, _| keys.contains(k));
        self.sizes.retain(|k, _| keys.contains(k));
        for key in self.keys.iter() {
            self.last_accessed.entry(key.clone()).or_insert(0);
        }
        if self.sizes.len() == self.keys.len() {
            self.total_size = self.sizes.values().sum();
        }
    }

    /// Whether the accounting invariants hold.
    pub fn is_consistent(&self) -> bool {
        self.sizes.len() == self.keys.len()
            && self.keys.iter().all(|k| self.sizes.contains_key(k))
            && self.total_size == self.sizes.values().sum::<u64>()
            && self.last_accessed.len() == self.keys.len()
    }
}
