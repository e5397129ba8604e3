//! Partitioned key-value store for cache entries and metadata.
//!
//! Each cache domain writes into its own named partition, laid out as
//! `{partition}/{key}` in an `object_store` backend (in-memory for tests and
//! short-lived processes, local filesystem for persistence across restarts).

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore};
use std::sync::Arc;
use tracing::{debug, instrument};

use weather_common::{WeatherError, WeatherResult};

use crate::config::StoreBackend;

/// Logical namespaces inside the store. Keys never collide across partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Weather,
    DetailedWeather,
    Mesh,
    Metadata,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Weather => "weather",
            Partition::DetailedWeather => "weather-detailed",
            Partition::Mesh => "mesh",
            Partition::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Async get/set/remove/clear over named partitions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent.
    async fn get(&self, partition: Partition, key: &str) -> WeatherResult<Option<Bytes>>;

    /// Write (or overwrite) a value.
    async fn set(&self, partition: Partition, key: &str, value: Bytes) -> WeatherResult<()>;

    /// Delete a value. Deleting an absent key succeeds.
    async fn remove(&self, partition: Partition, key: &str) -> WeatherResult<()>;

    /// Delete every value in a partition, returning how many were removed.
    async fn clear(&self, partition: Partition) -> WeatherResult<u64>;
}

/// `KvStore` backed by any `object_store` implementation.
pub struct ObjectKvStore {
    store: Arc<dyn ObjectStore>,
    backend: &'static str,
}

impl ObjectKvStore {
    /// Volatile store, lost when the process exits.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            backend: "memory",
        }
    }

    /// Store rooted at a local directory; survives restarts.
    pub fn filesystem(root: &std::path::Path) -> WeatherResult<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
            WeatherError::StorageFailure(format!(
                "Failed to open cache directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            store: Arc::new(store),
            backend: "filesystem",
        })
    }

    /// Build the store described by configuration.
    pub fn from_backend(backend: &StoreBackend) -> WeatherResult<Self> {
        match backend {
            StoreBackend::Memory => Ok(Self::in_memory()),
            StoreBackend::Filesystem { root } => Self::filesystem(root),
        }
    }

    fn location(partition: Partition, key: &str) -> Path {
        Path::from(partition.as_str()).child(key)
    }
}

#[async_trait]
impl KvStore for ObjectKvStore {
    #[instrument(skip(self), fields(backend = self.backend))]
    async fn get(&self, partition: Partition, key: &str) -> WeatherResult<Option<Bytes>> {
        let location = Self::location(partition, key);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(WeatherError::StorageFailure(format!(
                    "Failed to read {}: {}",
                    location, e
                )))
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| WeatherError::StorageFailure(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read cache object");
        Ok(Some(bytes))
    }

    #[instrument(skip(self, value), fields(backend = self.backend, size = value.len()))]
    async fn set(&self, partition: Partition, key: &str, value: Bytes) -> WeatherResult<()> {
        let location = Self::location(partition, key);

        self.store
            .put(&location, value)
            .await
            .map_err(|e| WeatherError::StorageFailure(format!("Failed to write {}: {}", location, e)))?;

        Ok(())
    }

    async fn remove(&self, partition: Partition, key: &str) -> WeatherResult<()> {
        let location = Self::location(partition, key);

        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(WeatherError::StorageFailure(format!(
                "Failed to delete {}: {}",
                location, e
            ))),
        }
    }

    async fn clear(&self, partition: Partition) -> WeatherResult<u64> {
        let prefix = Path::from(partition.as_str());

        let locations: Vec<Path> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(|e| WeatherError::StorageFailure(format!("List failed: {}", e)))?;

        let mut removed = 0u64;
        for location in locations {
            match self.store.delete(&location).await {
                Ok(()) => removed += 1,
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => {
                    return Err(WeatherError::StorageFailure(format!(
                        "Failed to delete {}: {}",
                        location, e
                    )))
                }
            }
        }

        debug!(partition = %partition, removed, "Cleared partition");
        Ok(removed)
    }
}
