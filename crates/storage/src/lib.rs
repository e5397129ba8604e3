//! Persistent caches for the rainmap weather map.
//!
//! Provides:
//! - A partitioned key-value store over `object_store` (memory or local disk)
//! - Weather and mesh caches with TTL expiry, size budgets and LRU eviction
//! - A background sweeper that purges expired entries

pub mod config;
pub mod domain;
pub mod entry;
pub mod eviction;
pub mod keys;
pub mod kv_store;
pub mod mesh_cache;
pub mod metadata;
pub mod size;
pub mod sweeper;
pub mod weather_cache;

pub use config::{CacheConfig, DomainConfig, StoreBackend};
pub use domain::{CacheStats, Persist, SweepStats};
pub use entry::CacheEntry;
pub use eviction::{evict, EvictionPlan};
pub use keys::{derive_detailed_key, derive_entity_key, derive_mesh_key, derive_regional_key, KeyKind};
pub use kv_store::{KvStore, ObjectKvStore, Partition};
pub use mesh_cache::MeshCache;
pub use metadata::CacheMetadata;
pub use sweeper::{ExpirySweep, ExpirySweeper, SweepReport};
pub use weather_cache::{WeatherCache, WeatherCacheStats};
