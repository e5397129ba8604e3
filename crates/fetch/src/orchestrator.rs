//! Cache-first resolvers for weather payloads and meshes.
//!
//! Each resolver looks every id up in its cache, fetches the misses from the
//! remote source in concurrent bounded chunks, caches what came back per id,
//! and returns results in input order. Ids that could not be resolved are
//! dropped; only a non-empty request with nothing resolved is an error.

use indexmap::{IndexMap, IndexSet};
use metrics::counter;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use storage::{MeshCache, Persist, WeatherCache};
use weather_common::{MeshFeature, WeatherData, WeatherError, WeatherResult};

use crate::chunk::{fetch_in_chunks, ChunkFailure};
use crate::remote::{MeshSource, WeatherSource};

/// Detailed outcome of a resolve call.
#[derive(Debug)]
pub struct ResolveReport<T> {
    /// Resolved items in input order
    pub items: Vec<T>,
    /// Distinct ids served from cache
    pub from_cache: usize,
    /// Distinct ids fetched from the remote source
    pub fetched: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    /// Distinct ids neither cached nor fetched, in input order
    pub unresolved: Vec<String>,
}

impl<T> ResolveReport<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            from_cache: 0,
            fetched: 0,
            failed_chunks: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

fn record_failed_chunks(source: &'static str, failures: &[ChunkFailure]) {
    if !failures.is_empty() {
        counter!("fetch_chunks_failed_total", "source" => source).increment(failures.len() as u64);
    }
}

// ============================================================================
// Weather
// ============================================================================

pub struct WeatherResolver {
    cache: Arc<WeatherCache>,
    source: Arc<dyn WeatherSource>,
    max_batch: NonZeroUsize,
}

impl WeatherResolver {
    pub fn new(cache: Arc<WeatherCache>, source: Arc<dyn WeatherSource>, max_batch: NonZeroUsize) -> Self {
        Self {
            cache,
            source,
            max_batch,
        }
    }

    /// Weather for `city_ids` at a date/time, in input order.
    pub async fn resolve(&self, city_ids: &[String], date: &str, time: &str) -> WeatherResult<Vec<WeatherData>> {
        Ok(self.resolve_report(city_ids, date, time).await?.items)
    }

    #[instrument(skip(self, city_ids), fields(requested = city_ids.len()))]
    pub async fn resolve_report(
        &self,
        city_ids: &[String],
        date: &str,
        time: &str,
    ) -> WeatherResult<ResolveReport<WeatherData>> {
        if city_ids.is_empty() {
            return Ok(ResolveReport::empty());
        }

        let mut resolved: HashMap<String, WeatherData> = HashMap::new();
        let mut misses: IndexSet<String> = IndexSet::new();

        for id in city_ids {
            if resolved.contains_key(id) || misses.contains(id) {
                continue;
            }
            match self.cache.get(id, date, time).await? {
                Some(data) => {
                    resolved.insert(id.clone(), data);
                }
                None => {
                    misses.insert(id.clone());
                }
            }
        }

        let from_cache = resolved.len();
        let misses: Vec<String> = misses.into_iter().collect();
        let mut failed_chunks = Vec::new();
        let mut fetched = 0;

        if !misses.is_empty() {
            debug!(cached = from_cache, missing = misses.len(), "Fetching uncached cities");

            let outcome = fetch_in_chunks(&misses, self.max_batch, |chunk| async move {
                self.source.fetch_regional(&chunk, date, time).await
            })
            .await;
            record_failed_chunks("weather", &outcome.failures);

            let wanted: IndexSet<&str> = misses.iter().map(String::as_str).collect();
            let mut new_items = Vec::with_capacity(outcome.items.len());
            for item in outcome.items {
                if !wanted.contains(item.city_id.as_str()) || resolved.contains_key(&item.city_id) {
                    continue;
                }
                resolved.insert(item.city_id.clone(), item.clone());
                new_items.push(item);
            }

            fetched = new_items.len();
            self.cache.set_many(date, time, &new_items).await?;
            failed_chunks = outcome.failures;
        }

        let items: Vec<WeatherData> = city_ids
            .iter()
            .filter_map(|id| resolved.get(id).cloned())
            .collect();

        let unresolved: Vec<String> = misses
            .into_iter()
            .filter(|id| !resolved.contains_key(id))
            .collect();

        if items.is_empty() {
            return Err(WeatherError::AllFetchesFailed {
                requested: city_ids.len(),
                failed_chunks: failed_chunks.len(),
            });
        }

        if !unresolved.is_empty() {
            warn!(
                unresolved = unresolved.len(),
                failed_chunks = failed_chunks.len(),
                "Some cities could not be resolved"
            );
        }
        info!(
            requested = city_ids.len(),
            from_cache,
            fetched,
            returned = items.len(),
            "Weather resolved"
        );

        Ok(ResolveReport {
            items,
            from_cache,
            fetched,
            failed_chunks,
            unresolved,
        })
    }

    /// Regional aggregate, in input order.
    ///
    /// Served from the aggregate key when present. Otherwise resolved city by
    /// city; the aggregate is stored only when every city resolved, so a
    /// partial result is retried on the next call.
    #[instrument(skip(self, city_ids), fields(requested = city_ids.len()))]
    pub async fn resolve_regional(
        &self,
        city_ids: &[String],
        date: &str,
        time: &str,
        radius: Option<u32>,
    ) -> WeatherResult<Vec<WeatherData>> {
        if city_ids.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.cache.get_regional(city_ids, date, time, radius).await? {
            debug!(count = cached.len(), "Regional aggregate served from cache");
            let by_id: HashMap<String, WeatherData> = cached
                .into_iter()
                .map(|item| (item.city_id.clone(), item))
                .collect();
            return Ok(city_ids.iter().filter_map(|id| by_id.get(id).cloned()).collect());
        }

        let report = self.resolve_report(city_ids, date, time).await?;
        if report.unresolved.is_empty() && report.failed_chunks.is_empty() {
            self.cache
                .set_regional(city_ids, date, time, radius, &report.items)
                .await?;
        } else {
            debug!(
                unresolved = report.unresolved.len(),
                "Partial regional result, aggregate not stored"
            );
        }
        Ok(report.items)
    }

    /// Weather for `center_id` and every municipality within `radius_km`,
    /// center first, then nearest neighbors.
    #[instrument(skip(self))]
    pub async fn resolve_around(
        &self,
        center_id: &str,
        radius_km: u32,
        date: &str,
        time: &str,
    ) -> WeatherResult<Vec<WeatherData>> {
        let region = self.source.neighbors(center_id, radius_km).await?;
        let city_ids = region.city_ids();
        debug!(cities = city_ids.len(), "Neighbor cities found");

        self.resolve_regional(&city_ids, date, time, Some(radius_km))
            .await
    }

    /// Detailed view for one city, fetched on miss.
    #[instrument(skip(self))]
    pub async fn resolve_detailed(&self, city_id: &str) -> WeatherResult<WeatherData> {
        if let Some(data) = self.cache.get_detailed(city_id).await? {
            return Ok(data);
        }

        let data = self.source.fetch_city(city_id).await?;
        self.cache.set_detailed(city_id, &data).await?;
        Ok(data)
    }
}

// ============================================================================
// Meshes
// ============================================================================

pub struct MeshResolver {
    cache: Arc<MeshCache>,
    source: Arc<dyn MeshSource>,
    max_batch: NonZeroUsize,
}

impl MeshResolver {
    pub fn new(cache: Arc<MeshCache>, source: Arc<dyn MeshSource>, max_batch: NonZeroUsize) -> Self {
        Self {
            cache,
            source,
            max_batch,
        }
    }

    /// Boundaries for `ids`, keyed by id in input order.
    ///
    /// All cache reads and writes in one call persist metadata once.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn resolve(&self, ids: &[String]) -> WeatherResult<IndexMap<String, MeshFeature>> {
        if ids.is_empty() {
            return Ok(IndexMap::new());
        }

        let mut resolved: HashMap<String, MeshFeature> = HashMap::new();
        let mut misses: IndexSet<String> = IndexSet::new();

        for id in ids {
            if resolved.contains_key(id) || misses.contains(id) {
                continue;
            }
            match self.cache.get_with(id, Persist::Deferred).await? {
                Some(feature) => {
                    resolved.insert(id.clone(), feature);
                }
                None => {
                    misses.insert(id.clone());
                }
            }
        }

        let from_cache = resolved.len();
        let misses: Vec<String> = misses.into_iter().collect();
        let mut failed_chunks = 0;

        if !misses.is_empty() {
            let outcome = fetch_in_chunks(&misses, self.max_batch, |chunk| async move {
                self.source
                    .fetch_meshes(&chunk)
                    .await
                    .map(|found| found.into_iter().collect::<Vec<_>>())
            })
            .await;
            record_failed_chunks("mesh", &outcome.failures);
            failed_chunks = outcome.failures.len();

            let wanted: IndexSet<&str> = misses.iter().map(String::as_str).collect();
            for (id, feature) in outcome.items {
                if !wanted.contains(id.as_str()) || resolved.contains_key(&id) {
                    continue;
                }
                self.cache.set_with(&id, &feature, Persist::Deferred).await?;
                resolved.insert(id, feature);
            }
        }

        self.cache.flush().await?;

        let mut result = IndexMap::with_capacity(resolved.len());
        for id in ids {
            if let Some(feature) = resolved.remove(id) {
                result.insert(id.clone(), feature);
            }
        }

        if result.is_empty() {
            return Err(WeatherError::AllFetchesFailed {
                requested: ids.len(),
                failed_chunks,
            });
        }

        info!(
            requested = ids.len(),
            from_cache,
            returned = result.len(),
            "Meshes resolved"
        );
        Ok(result)
    }
}
