//! Municipality boundary (GeoJSON) cache.
//!
//! Boundaries change rarely, so entries live for a week under their own
//! budget. Bulk paths defer metadata persistence and flush once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use weather_common::{Clock, MeshFeature, WeatherResult};

use crate::config::CacheConfig;
use crate::domain::{CacheDomain, CacheStats, Persist, SweepStats};
use crate::keys::derive_mesh_key;
use crate::kv_store::{KvStore, Partition};

pub const MESH_DOMAIN: &str = "mesh";

fn route(_key: &str) -> Partition {
    Partition::Mesh
}

pub struct MeshCache {
    domain: CacheDomain,
    ttl: Duration,
}

impl MeshCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self::with_limits(store, clock, config.mesh.budget_bytes, config.mesh.ttl())
    }

    pub fn with_limits(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        budget_bytes: u64,
        ttl: Duration,
    ) -> Self {
        Self {
            domain: CacheDomain::new(MESH_DOMAIN, store, clock, budget_bytes, route),
            ttl,
        }
    }

    pub async fn initialize(&self) {
        self.domain.initialize().await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, municipality_id: &str) -> WeatherResult<Option<MeshFeature>> {
        self.get_with(municipality_id, Persist::Immediate).await
    }

    /// Read with explicit persistence; pair `Deferred` with a final `flush()`.
    pub async fn get_with(
        &self,
        municipality_id: &str,
        persist: Persist,
    ) -> WeatherResult<Option<MeshFeature>> {
        let key = derive_mesh_key(municipality_id);
        self.domain.read(&key, self.ttl, persist).await
    }

    pub async fn set(&self, municipality_id: &str, feature: &MeshFeature) -> WeatherResult<()> {
        self.set_with(municipality_id, feature, Persist::Immediate).await
    }

    pub async fn set_with(
        &self,
        municipality_id: &str,
        feature: &MeshFeature,
        persist: Persist,
    ) -> WeatherResult<()> {
        let key = derive_mesh_key(municipality_id);
        self.domain.write(&key, feature, persist).await
    }

    pub async fn has(&self, municipality_id: &str) -> WeatherResult<bool> {
        Ok(self.get(municipality_id).await?.is_some())
    }

    /// Fresh features for the given ids; misses are simply absent.
    pub async fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> WeatherResult<HashMap<String, MeshFeature>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            if found.contains_key(id) {
                continue;
            }
            if let Some(feature) = self.get_with(id, Persist::Deferred).await? {
                found.insert(id.to_string(), feature);
            }
        }
        self.domain.flush().await?;

        debug!(requested = ids.len(), hits = found.len(), "Mesh cache lookup");
        Ok(found)
    }

    pub async fn set_many<'a, I>(&self, entries: I) -> WeatherResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a MeshFeature)>,
    {
        let mut written = 0usize;
        for (id, feature) in entries {
            self.set_with(id, feature, Persist::Deferred).await?;
            written += 1;
        }
        if written > 0 {
            self.domain.flush().await?;
        }
        Ok(())
    }

    pub async fn remove(&self, municipality_id: &str) -> WeatherResult<bool> {
        self.domain.remove(&derive_mesh_key(municipality_id)).await
    }

    pub async fn clear(&self) -> WeatherResult<()> {
        self.domain.clear(&[Partition::Mesh]).await
    }

    pub async fn sweep_expired(&self) -> WeatherResult<SweepStats> {
        let ttl = self.ttl;
        self.domain.sweep(|_| ttl).await
    }

    pub async fn flush(&self) -> WeatherResult<()> {
        self.domain.flush().await
    }

    pub async fn stats(&self) -> WeatherResult<CacheStats> {
        self.domain.stats().await
    }

    pub async fn metadata(&self) -> WeatherResult<crate::metadata::CacheMetadata> {
        self.domain.snapshot().await
    }
}
