//! Least-recently-accessed eviction over a domain's metadata.

use crate::metadata::CacheMetadata;

/// Keys removed from the metadata that the caller must delete from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub victims: Vec<String>,
    pub bytes_freed: u64,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }
}

/// Remove the oldest entries until `total_size + required_space <= budget`.
///
/// Entries are ordered by last access (oldest first); ties keep insertion
/// order. If the budget cannot be met even with everything evicted, the
/// metadata ends up empty and the caller's write still proceeds.
pub fn evict(metadata: &mut CacheMetadata, required_space: u64, budget: u64) -> EvictionPlan {
    let mut plan = EvictionPlan::default();

    if metadata.total_size + required_space <= budget {
        return plan;
    }

    let mut candidates: Vec<(String, i64)> = metadata
        .keys
        .iter()
        .map(|key| {
            let accessed = metadata.last_accessed.get(key).copied().unwrap_or(0);
            (key.clone(), accessed)
        })
        .collect();
    // Stable sort keeps insertion order among equal timestamps
    candidates.sort_by_key(|(_, accessed)| *accessed);

    for (key, _) in candidates {
        if metadata.total_size + required_space <= budget {
            break;
        }
        if let Some(freed) = metadata.forget(&key) {
            plan.bytes_freed += freed;
            plan.victims.push(key);
        }
    }

    plan
}
