//! Shared machinery behind the weather and mesh caches.
//!
//! A `CacheDomain` owns one metadata ledger, one size budget and a router
//! mapping keys to store partitions. It implements TTL checks on read, budget
//! eviction on write, lazy self-healing of metadata, and persistence.
//!
//! Storage failures never escape: reads degrade to misses, writes to no-ops.
//! The only errors callers see are `NotInitialized` and serialization bugs.

use bytes::Bytes;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use weather_common::{is_valid, Clock, WeatherError, WeatherResult};

use crate::entry::{CacheEntry, EntryHeader};
use crate::eviction::{evict, EvictionPlan};
use crate::kv_store::{KvStore, Partition};
use crate::metadata::CacheMetadata;
use crate::size::{as_mib, estimate_size, to_plain};

/// Whether a call persists metadata before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persist {
    #[default]
    Immediate,
    /// Caller will `flush()` once at the end of a batch
    Deferred,
}

/// Read-only usage figures for diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size: u64,
    pub budget: u64,
    pub usage_percent: f64,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepStats {
    /// Keys examined
    pub scanned: usize,
    /// Entries deleted because their TTL elapsed
    pub expired: usize,
    /// Tracked keys whose entry was already gone
    pub healed: usize,
    /// Store errors skipped over
    pub errors: usize,
}

pub struct CacheDomain {
    name: &'static str,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    budget: u64,
    router: fn(&str) -> Partition,
    metadata: Mutex<Option<CacheMetadata>>,
    persist_lock: Mutex<()>,
}

impl CacheDomain {
    pub fn new(
        name: &'static str,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        budget: u64,
        router: fn(&str) -> Partition,
    ) -> Self {
        Self {
            name,
            store,
            clock,
            budget,
            router,
            metadata: Mutex::new(None),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Load persisted metadata. Must complete before any other operation.
    ///
    /// Missing, unreadable or corrupt metadata starts the domain empty; stale
    /// entries left in the store are then cleaned up as orphans on read.
    pub async fn initialize(&self) {
        if self.metadata.lock().await.is_some() {
            return;
        }

        let loaded = match self.store.get(Partition::Metadata, self.name).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CacheMetadata>(&bytes) {
                Ok(mut metadata) => {
                    metadata.repair();
                    metadata
                }
                Err(e) => {
                    warn!(domain = self.name, error = %e, "Corrupt cache metadata, starting empty");
                    CacheMetadata::default()
                }
            },
            Ok(None) => CacheMetadata::default(),
            Err(e) => {
                self.record_storage_error();
                warn!(domain = self.name, error = %e, "Cache metadata unavailable, starting empty");
                CacheMetadata::default()
            }
        };

        info!(
            domain = self.name,
            entries = loaded.entry_count(),
            total_size = loaded.total_size,
            budget = self.budget,
            "Cache initialized"
        );

        let mut guard = self.metadata.lock().await;
        if guard.is_none() {
            *guard = Some(loaded);
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.metadata.lock().await.is_some()
    }

    /// Run `f` against the metadata under the lock. Never held across store I/O.
    async fn update<R>(&self, f: impl FnOnce(&mut CacheMetadata) -> R) -> WeatherResult<R> {
        let mut guard = self.metadata.lock().await;
        let metadata = guard
            .as_mut()
            .ok_or(WeatherError::NotInitialized(self.name))?;
        Ok(f(metadata))
    }

    /// Read a fresh entry, or `None` on miss, expiry or storage failure.
    pub async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
        persist: Persist,
    ) -> WeatherResult<Option<T>> {
        self.update(|_| ()).await?;
        let partition = (self.router)(key);

        let bytes = match self.store.get(partition, key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                // Tracked but gone: treat as an implicit eviction
                let healed = self
                    .update(|m| !m.is_writing(key) && m.forget(key).is_some())
                    .await?;
                if healed {
                    debug!(domain = self.name, key = %key, "Dropped metadata for missing entry");
                    self.persist_if(persist).await;
                }
                self.record_miss();
                return Ok(None);
            }
            Err(e) => {
                self.record_storage_error();
                warn!(domain = self.name, key = %key, error = %e, "Cache read failed, treating as miss");
                self.record_miss();
                return Ok(None);
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(domain = self.name, key = %key, error = %e, "Undecodable cache entry, discarding");
                self.discard(key, persist).await?;
                self.record_miss();
                return Ok(None);
            }
        };

        let now = self.clock.now_millis();
        if !is_valid(entry.timestamp, ttl, now) {
            debug!(domain = self.name, key = %key, "Cache entry expired");
            self.discard(key, persist).await?;
            self.record_miss();
            return Ok(None);
        }

        let tracked = self.update(|m| m.touch(key, now)).await?;
        if !tracked {
            debug!(domain = self.name, key = %key, "Removing orphaned cache entry");
            if let Err(e) = self.store.remove(partition, key).await {
                self.record_storage_error();
                warn!(domain = self.name, key = %key, error = %e, "Failed to remove orphan");
            }
            self.record_miss();
            return Ok(None);
        }

        self.persist_if(persist).await;
        self.record_hit();
        Ok(Some(entry.data))
    }

    /// Write an entry, evicting least-recently-accessed entries first if the
    /// write would exceed the budget.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        persist: Persist,
    ) -> WeatherResult<()> {
        self.update(|_| ()).await?;
        let partition = (self.router)(key);

        let data = to_plain(value)?;
        let size = estimate_size(&data)?;
        let now = self.clock.now_millis();
        let bytes = Bytes::from(serde_json::to_vec(&CacheEntry {
            data,
            timestamp: now,
            size,
        })?);

        let budget = self.budget;
        let plan = self
            .update(|m| {
                m.forget(key);
                let plan = evict(m, size, budget);
                m.record(key, size, now);
                m.begin_write(key);
                plan
            })
            .await?;

        if !plan.is_empty() {
            self.delete_victims(&plan).await;
        }

        let write_result = self.store.set(partition, key, bytes).await;
        let failed = write_result.is_err();

        let still_tracked = self
            .update(|m| {
                m.end_write(key);
                if failed && !m.is_writing(key) {
                    m.forget(key);
                }
                m.contains(key)
            })
            .await?;

        match write_result {
            Ok(()) if !still_tracked => {
                // Cleared or evicted while the write was in flight
                if let Err(e) = self.store.remove(partition, key).await {
                    self.record_storage_error();
                    warn!(domain = self.name, key = %key, error = %e, "Failed to drop superseded write");
                }
            }
            Ok(()) => {
                debug!(domain = self.name, key = %key, size, "Cached entry");
            }
            Err(e) => {
                self.record_storage_error();
                warn!(domain = self.name, key = %key, error = %e, "Cache write failed, skipping");
            }
        }

        self.persist_if(persist).await;
        Ok(())
    }

    async fn delete_victims(&self, plan: &EvictionPlan) {
        counter!("cache_evictions_total", "domain" => self.name).increment(plan.victims.len() as u64);

        for victim in &plan.victims {
            if let Err(e) = self.store.remove((self.router)(victim), victim).await {
                self.record_storage_error();
                warn!(domain = self.name, key = %victim, error = %e, "Failed to delete evicted entry");
            }
        }

        info!(
            domain = self.name,
            entries_evicted = plan.victims.len(),
            bytes_freed_mb = as_mib(plan.bytes_freed),
            budget_mb = as_mib(self.budget),
            "Cache eviction completed"
        );
    }

    /// Forget a key and delete its entry, unless a fresh write is landing.
    async fn discard(&self, key: &str, persist: Persist) -> WeatherResult<()> {
        let forgotten = self
            .update(|m| {
                if m.is_writing(key) {
                    None
                } else {
                    Some(m.forget(key).is_some())
                }
            })
            .await?;

        let Some(was_tracked) = forgotten else {
            return Ok(());
        };

        if let Err(e) = self.store.remove((self.router)(key), key).await {
            self.record_storage_error();
            warn!(domain = self.name, key = %key, error = %e, "Failed to delete cache entry");
        }
        if was_tracked {
            self.persist_if(persist).await;
        }
        Ok(())
    }

    /// Explicitly remove one key. Returns whether it was tracked.
    pub async fn remove(&self, key: &str) -> WeatherResult<bool> {
        let was_tracked = self.update(|m| m.forget(key).is_some()).await?;

        if let Err(e) = self.store.remove((self.router)(key), key).await {
            self.record_storage_error();
            warn!(domain = self.name, key = %key, error = %e, "Failed to delete cache entry");
        }
        if was_tracked {
            self.persist_if(Persist::Immediate).await;
        }
        Ok(was_tracked)
    }

    /// Remove every tracked key matching `predicate`. Returns how many.
    pub async fn remove_where(&self, predicate: impl Fn(&str) -> bool) -> WeatherResult<usize> {
        let removed: Vec<String> = self
            .update(|m| {
                let matching: Vec<String> =
                    m.keys.iter().filter(|k| predicate(k.as_str())).cloned().collect();
                for key in &matching {
                    m.forget(key);
                }
                matching
            })
            .await?;

        for key in &removed {
            if let Err(e) = self.store.remove((self.router)(key), key).await {
                self.record_storage_error();
                warn!(domain = self.name, key = %key, error = %e, "Failed to delete cache entry");
            }
        }

        if !removed.is_empty() {
            self.persist_if(Persist::Immediate).await;
        }
        Ok(removed.len())
    }

    /// Wipe the given partitions and reset the metadata.
    ///
    /// Metadata is reset first so concurrent readers treat leftovers as
    /// orphans; by the time this returns nothing of the old state remains.
    pub async fn clear(&self, partitions: &[Partition]) -> WeatherResult<()> {
        let dropped = self
            .update(|m| {
                let count = m.entry_count();
                m.reset();
                count
            })
            .await?;

        for partition in partitions {
            if let Err(e) = self.store.clear(*partition).await {
                self.record_storage_error();
                warn!(domain = self.name, partition = %partition, error = %e, "Failed to clear partition");
            }
        }

        self.flush().await?;
        info!(domain = self.name, entries = dropped, "Cache cleared");
        Ok(())
    }

    /// Delete every entry whose TTL has elapsed. Persists metadata once.
    pub async fn sweep(&self, ttl_of: impl Fn(&str) -> Duration) -> WeatherResult<SweepStats> {
        let keys: Vec<String> = self.update(|m| m.keys.iter().cloned().collect()).await?;
        let now = self.clock.now_millis();
        let mut stats = SweepStats::default();

        for key in keys {
            stats.scanned += 1;

            match self.store.get((self.router)(&key), &key).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<EntryHeader>(&bytes) {
                    Ok(header) if is_valid(header.timestamp, ttl_of(&key), now) => {}
                    _ => {
                        self.discard(&key, Persist::Deferred).await?;
                        stats.expired += 1;
                    }
                },
                Ok(None) => {
                    let healed = self
                        .update(|m| !m.is_writing(&key) && m.forget(&key).is_some())
                        .await?;
                    if healed {
                        stats.healed += 1;
                    }
                }
                Err(e) => {
                    self.record_storage_error();
                    warn!(domain = self.name, key = %key, error = %e, "Sweep read failed");
                    stats.errors += 1;
                }
            }
        }

        self.flush().await?;

        info!(
            domain = self.name,
            scanned = stats.scanned,
            expired = stats.expired,
            healed = stats.healed,
            errors = stats.errors,
            "Expiry sweep complete"
        );
        Ok(stats)
    }

    /// Persist the current metadata.
    ///
    /// Snapshots are taken while holding the persist lock, so the last
    /// persisted snapshot is never older than an earlier one.
    pub async fn flush(&self) -> WeatherResult<()> {
        let _persist_guard = self.persist_lock.lock().await;

        let bytes = {
            let guard = self.metadata.lock().await;
            let metadata = guard
                .as_ref()
                .ok_or(WeatherError::NotInitialized(self.name))?;
            serde_json::to_vec(metadata)?
        };

        if let Err(e) = self
            .store
            .set(Partition::Metadata, self.name, Bytes::from(bytes))
            .await
        {
            self.record_storage_error();
            warn!(domain = self.name, error = %e, "Failed to persist cache metadata");
        }
        Ok(())
    }

    async fn persist_if(&self, persist: Persist) {
        if persist == Persist::Immediate {
            if let Err(e) = self.flush().await {
                warn!(domain = self.name, error = %e, "Failed to persist cache metadata");
            }
        }
    }

    /// Copy of the current metadata.
    pub async fn snapshot(&self) -> WeatherResult<CacheMetadata> {
        self.update(|m| m.clone()).await
    }

    pub async fn stats(&self) -> WeatherResult<CacheStats> {
        let budget = self.budget;
        self.update(|m| CacheStats {
            entry_count: m.entry_count(),
            total_size: m.total_size,
            budget,
            usage_percent: if budget == 0 {
                0.0
            } else {
                (m.total_size as f64 / budget as f64) * 100.0
            },
        })
        .await
    }

    fn record_hit(&self) {
        counter!("cache_hits_total", "domain" => self.name).increment(1);
    }

    fn record_miss(&self) {
        counter!("cache_misses_total", "domain" => self.name).increment(1);
    }

    fn record_storage_error(&self) {
        counter!("cache_storage_errors_total", "domain" => self.name).increment(1);
    }
}
