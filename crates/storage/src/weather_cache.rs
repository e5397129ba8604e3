//! Weather payload cache.
//!
//! Individual city payloads, regional aggregates and detailed views share one
//! size budget and one LRU pool. Detailed entries live in their own store
//! partition and use a longer TTL.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use weather_common::{Clock, WeatherData, WeatherResult};

use crate::config::CacheConfig;
use crate::domain::{CacheDomain, CacheStats, Persist, SweepStats};
use crate::keys::{derive_detailed_key, derive_entity_key, derive_regional_key, KeyKind};
use crate::kv_store::{KvStore, Partition};

/// Metadata key and metrics label for this domain.
pub const WEATHER_DOMAIN: &str = "weather";

fn route(key: &str) -> Partition {
    match KeyKind::classify(key) {
        KeyKind::Detailed => Partition::DetailedWeather,
        KeyKind::Individual | KeyKind::Regional => Partition::Weather,
    }
}

/// Usage broken down by key namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherCacheStats {
    #[serde(flatten)]
    pub usage: CacheStats,
    pub individual_entries: usize,
    pub regional_entries: usize,
    pub detailed_entries: usize,
}

pub struct WeatherCache {
    domain: CacheDomain,
    ttl: Duration,
    detailed_ttl: Duration,
}

impl WeatherCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self::with_limits(
            store,
            clock,
            config.weather.budget_bytes,
            config.weather.ttl(),
            config.detailed_ttl(),
        )
    }

    pub fn with_limits(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        budget_bytes: u64,
        ttl: Duration,
        detailed_ttl: Duration,
    ) -> Self {
        Self {
            domain: CacheDomain::new(WEATHER_DOMAIN, store, clock, budget_bytes, route),
            ttl,
            detailed_ttl,
        }
    }

    pub async fn initialize(&self) {
        self.domain.initialize().await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn detailed_ttl(&self) -> Duration {
        self.detailed_ttl
    }

    fn ttl_for(&self, key: &str) -> Duration {
        match KeyKind::classify(key) {
            KeyKind::Detailed => self.detailed_ttl,
            KeyKind::Individual | KeyKind::Regional => self.ttl,
        }
    }

    // ========================================================================
    // Individual cities
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn get(&self, city_id: &str, date: &str, time: &str) -> WeatherResult<Option<WeatherData>> {
        let key = derive_entity_key(city_id, date, time)?;
        self.domain.read(&key, self.ttl, Persist::Immediate).await
    }

    #[instrument(skip(self, data))]
    pub async fn set(&self, city_id: &str, date: &str, time: &str, data: &WeatherData) -> WeatherResult<()> {
        let key = derive_entity_key(city_id, date, time)?;
        self.domain.write(&key, data, Persist::Immediate).await
    }

    /// Whether a fresh entry exists. Counts as an access.
    pub async fn has(&self, city_id: &str, date: &str, time: &str) -> WeatherResult<bool> {
        Ok(self.get(city_id, date, time).await?.is_some())
    }

    pub async fn remove(&self, city_id: &str, date: &str, time: &str) -> WeatherResult<bool> {
        let key = derive_entity_key(city_id, date, time)?;
        self.domain.remove(&key).await
    }

    /// Cache each payload under its own city key; metadata is persisted once.
    pub async fn set_many(&self, date: &str, time: &str, items: &[WeatherData]) -> WeatherResult<()> {
        for data in items {
            let key = derive_entity_key(&data.city_id, date, time)?;
            self.domain.write(&key, data, Persist::Deferred).await?;
        }
        if !items.is_empty() {
            self.domain.flush().await?;
        }
        debug!(count = items.len(), "Cached weather batch");
        Ok(())
    }

    // ========================================================================
    // Regional aggregates
    // ========================================================================

    pub async fn get_regional<S: AsRef<str>>(
        &self,
        city_ids: &[S],
        date: &str,
        time: &str,
        radius: Option<u32>,
    ) -> WeatherResult<Option<Vec<WeatherData>>> {
        let key = derive_regional_key(city_ids, date, time, radius)?;
        self.domain.read(&key, self.ttl, Persist::Immediate).await
    }

    pub async fn set_regional<S: AsRef<str>>(
        &self,
        city_ids: &[S],
        date: &str,
        time: &str,
        radius: Option<u32>,
        data: &[WeatherData],
    ) -> WeatherResult<()> {
        let key = derive_regional_key(city_ids, date, time, radius)?;
        self.domain.write(&key, data, Persist::Immediate).await
    }

    pub async fn has_regional<S: AsRef<str>>(
        &self,
        city_ids: &[S],
        date: &str,
        time: &str,
        radius: Option<u32>,
    ) -> WeatherResult<bool> {
        Ok(self.get_regional(city_ids, date, time, radius).await?.is_some())
    }

    pub async fn remove_regional<S: AsRef<str>>(
        &self,
        city_ids: &[S],
        date: &str,
        time: &str,
        radius: Option<u32>,
    ) -> WeatherResult<bool> {
        let key = derive_regional_key(city_ids, date, time, radius)?;
        self.domain.remove(&key).await
    }

    // ========================================================================
    // Detailed views
    // ========================================================================

    pub async fn get_detailed(&self, city_id: &str) -> WeatherResult<Option<WeatherData>> {
        let key = derive_detailed_key(city_id);
        self.domain.read(&key, self.detailed_ttl, Persist::Immediate).await
    }

    pub async fn set_detailed(&self, city_id: &str, data: &WeatherData) -> WeatherResult<()> {
        let key = derive_detailed_key(city_id);
        self.domain.write(&key, data, Persist::Immediate).await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop every weather entry of every kind.
    pub async fn clear(&self) -> WeatherResult<()> {
        self.domain
            .clear(&[Partition::Weather, Partition::DetailedWeather])
            .await
    }

    /// Drop single-city entries, keeping regional and detailed ones.
    pub async fn clear_individual(&self) -> WeatherResult<usize> {
        self.domain
            .remove_where(|key| KeyKind::classify(key) == KeyKind::Individual)
            .await
    }

    pub async fn clear_regional(&self) -> WeatherResult<usize> {
        self.domain
            .remove_where(|key| KeyKind::classify(key) == KeyKind::Regional)
            .await
    }

    pub async fn sweep_expired(&self) -> WeatherResult<SweepStats> {
        self.domain.sweep(|key| self.ttl_for(key)).await
    }

    pub async fn flush(&self) -> WeatherResult<()> {
        self.domain.flush().await
    }

    pub async fn stats(&self) -> WeatherResult<WeatherCacheStats> {
        let usage = self.domain.stats().await?;
        let metadata = self.domain.snapshot().await?;

        let mut stats = WeatherCacheStats {
            usage,
            individual_entries: 0,
            regional_entries: 0,
            detailed_entries: 0,
        };
        for key in metadata.keys.iter() {
            match KeyKind::classify(key) {
                KeyKind::Individual => stats.individual_entries += 1,
                KeyKind::Regional => stats.regional_entries += 1,
                KeyKind::Detailed => stats.detailed_entries += 1,
            }
        }
        Ok(stats)
    }

    pub async fn metadata(&self) -> WeatherResult<crate::metadata::CacheMetadata> {
        self.domain.snapshot().await
    }
}
