//! Resolver tests against in-memory sources and caches.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use fetch::{MeshResolver, MeshSource, WeatherResolver, WeatherSource};
use storage::{CacheConfig, MeshCache, ObjectKvStore, WeatherCache};
use test_utils::{
    city_ids, city_ids_with_duplicates, sample_mesh, sample_neighbors, sample_weather, SAMPLE_DATE,
    SAMPLE_TIME,
};
use weather_common::{
    ManualClock, MeshFeature, NeighborCitiesResponse, WeatherData, WeatherError, WeatherResult,
};

const T0: i64 = 1_763_737_200_000;

/// Weather source that records every batch and fails the ones containing
/// any of `failing_ids`. Ids in `failing_once` fail their batch a single time.
#[derive(Default)]
struct ScriptedWeather {
    calls: Mutex<Vec<Vec<String>>>,
    failing_ids: HashSet<String>,
    failing_once: Mutex<HashSet<String>>,
    neighbors: Option<NeighborCitiesResponse>,
    fail_all: bool,
    reverse: bool,
    barrier: Option<Arc<Barrier>>,
}

impl ScriptedWeather {
    fn failing(ids: &[String]) -> Self {
        Self {
            failing_ids: ids.iter().cloned().collect(),
            ..Default::default()
        }
    }

    fn recovering(ids: &[String]) -> Self {
        Self {
            failing_once: Mutex::new(ids.iter().cloned().collect()),
            ..Default::default()
        }
    }

    fn batch_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.calls.lock().unwrap().iter().map(Vec::len).collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WeatherSource for ScriptedWeather {
    async fn fetch_city(&self, city_id: &str) -> WeatherResult<WeatherData> {
        self.calls.lock().unwrap().push(vec![city_id.to_string()]);
        if self.fail_all {
            return Err(WeatherError::Timeout);
        }
        Ok(sample_weather(city_id))
    }

    async fn fetch_regional(
        &self,
        city_ids: &[String],
        _date: &str,
        _time: &str,
    ) -> WeatherResult<Vec<WeatherData>> {
        self.calls.lock().unwrap().push(city_ids.to_vec());

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.fail_all || city_ids.iter().any(|id| self.failing_ids.contains(id)) {
            return Err(WeatherError::RemoteFetchFailure("HTTP 503".into()));
        }
        {
            let mut once = self.failing_once.lock().unwrap();
            let before = once.len();
            once.retain(|id| !city_ids.contains(id));
            if once.len() != before {
                return Err(WeatherError::RemoteFetchFailure("HTTP 502".into()));
            }
        }

        let mut items: Vec<WeatherData> = city_ids.iter().map(|id| sample_weather(id)).collect();
        if self.reverse {
            items.reverse();
        }
        Ok(items)
    }

    async fn neighbors(&self, center_id: &str, _radius_km: u32) -> WeatherResult<NeighborCitiesResponse> {
        self.calls.lock().unwrap().push(vec![center_id.to_string()]);
        self.neighbors
            .clone()
            .ok_or_else(|| WeatherError::RemoteFetchFailure("HTTP 404".into()))
    }
}

fn batch(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

async fn weather_cache() -> Arc<WeatherCache> {
    let cache = WeatherCache::new(
        Arc::new(ObjectKvStore::in_memory()),
        Arc::new(ManualClock::new(T0)),
        &CacheConfig::default(),
    );
    cache.initialize().await;
    Arc::new(cache)
}

// ============================================================================
// Chunking
// ============================================================================

#[tokio::test]
async fn test_123_ids_make_three_batches() {
    let source = Arc::new(ScriptedWeather::default());
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(50));
    let ids = city_ids(123);

    let items = resolver.resolve(&ids, SAMPLE_DATE, SAMPLE_TIME).await.unwrap();

    assert_eq!(items.len(), 123);
    assert_eq!(source.batch_sizes(), vec![50, 50, 23]);
}

#[tokio::test]
async fn test_chunks_are_fetched_concurrently() {
    // Every chunk waits for all three to arrive; a sequential fetch would hang
    let source = Arc::new(ScriptedWeather {
        barrier: Some(Arc::new(Barrier::new(3))),
        ..Default::default()
    });
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(10));
    let ids = city_ids(25);

    let items = tokio::time::timeout(
        Duration::from_secs(5),
        resolver.resolve(&ids, SAMPLE_DATE, SAMPLE_TIME),
    )
    .await
    .expect("chunks should not be serialized")
    .unwrap();

    assert_eq!(items.len(), 25);
}

#[tokio::test]
async fn test_empty_input_short_circuits() {
    let source = Arc::new(ScriptedWeather {
        fail_all: true,
        ..Default::default()
    });
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(50));

    let items = resolver.resolve(&[], SAMPLE_DATE, SAMPLE_TIME).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(source.call_count(), 0);
}

// ============================================================================
// Partial and total failure
// ============================================================================

#[tokio::test]
async fn test_failed_chunk_drops_only_its_ids() {
    let ids = city_ids(123);
    let second_chunk = ids[50..100].to_vec();
    let source = Arc::new(ScriptedWeather::failing(&second_chunk[..1]));
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(50));

    let report = resolver
        .resolve_report(&ids, SAMPLE_DATE, SAMPLE_TIME)
        .await
        .unwrap();

    assert_eq!(report.items.len(), 73);
    assert_eq!(report.fetched, 73);
    assert_eq!(report.failed_chunks.len(), 1);
    assert_eq!(report.failed_chunks[0].ids, second_chunk);
    assert_eq!(report.unresolved, second_chunk);

    let expected: Vec<String> = ids[..50].iter().chain(&ids[100..]).cloned().collect();
    let returned: Vec<String> = report.items.iter().map(|d| d.city_id.clone()).collect();
    assert_eq!(returned, expected);
}

#[tokio::test]
async fn test_all_chunks_failing_is_an_error() {
    let source = Arc::new(ScriptedWeather {
        fail_all: true,
        ..Default::default()
    });
    let resolver = WeatherResolver::new(weather_cache().await, source, batch(50));

    let err = resolver
        .resolve(&city_ids(123), SAMPLE_DATE, SAMPLE_TIME)
        .await
        .unwrap_err();

    match err {
        WeatherError::AllFetchesFailed {
            requested,
            failed_chunks,
        } => {
            assert_eq!(requested, 123);
            assert_eq!(failed_chunks, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_cached_cities_survive_total_failure() {
    let cache = weather_cache().await;
    let ids = city_ids(20);
    for id in &ids[..5] {
        cache
            .set(id, SAMPLE_DATE, SAMPLE_TIME, &sample_weather(id))
            .await
            .unwrap();
    }

    let source = Arc::new(ScriptedWeather {
        fail_all: true,
        ..Default::default()
    });
    let resolver = WeatherResolver::new(cache, source.clone(), batch(50));

    let report = resolver
        .resolve_report(&ids, SAMPLE_DATE, SAMPLE_TIME)
        .await
        .unwrap();
    assert_eq!(report.from_cache, 5);
    assert_eq!(report.items.len(), 5);
    assert_eq!(report.unresolved.len(), 15);
    // Only the misses were requested
    assert_eq!(source.batch_sizes(), vec![15]);
}

#[tokio::test]
async fn test_invalid_time_propagates() {
    let resolver = WeatherResolver::new(
        weather_cache().await,
        Arc::new(ScriptedWeather::default()),
        batch(50),
    );
    let err = resolver
        .resolve(&city_ids(3), SAMPLE_DATE, "3pm")
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::InvalidTimeFormat(_)));
}

// ============================================================================
// Caching and ordering
// ============================================================================

#[tokio::test]
async fn test_fetched_cities_are_cached_individually() {
    let cache = weather_cache().await;
    let source = Arc::new(ScriptedWeather::default());
    let resolver = WeatherResolver::new(cache.clone(), source.clone(), batch(4));
    let ids = city_ids(10);

    resolver.resolve(&ids, SAMPLE_DATE, SAMPLE_TIME).await.unwrap();
    assert_eq!(source.call_count(), 3);

    for id in &ids {
        assert_eq!(
            cache.get(id, SAMPLE_DATE, SAMPLE_TIME).await.unwrap(),
            Some(sample_weather(id))
        );
    }

    // A subset request is served entirely from cache
    let subset = ids[3..7].to_vec();
    let items = resolver.resolve(&subset, SAMPLE_DATE, SAMPLE_TIME).await.unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(source.call_count(), 3);
}

#[tokio::test]
async fn test_output_follows_input_order() {
    let source = Arc::new(ScriptedWeather {
        reverse: true,
        ..Default::default()
    });
    let cache = weather_cache().await;
    let mut ids = city_ids(12);
    cache
        .set(&ids[6], SAMPLE_DATE, SAMPLE_TIME, &sample_weather(&ids[6]))
        .await
        .unwrap();
    ids.swap(0, 11);

    let resolver = WeatherResolver::new(cache, source, batch(5));
    let items = resolver.resolve(&ids, SAMPLE_DATE, SAMPLE_TIME).await.unwrap();

    let returned: Vec<&str> = items.iter().map(|d| d.city_id.as_str()).collect();
    let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
    assert_eq!(returned, expected);
}

#[tokio::test]
async fn test_duplicate_ids_fetched_once() {
    let source = Arc::new(ScriptedWeather::default());
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(50));
    let ids = city_ids_with_duplicates(6, 2);

    let items = resolver.resolve(&ids, SAMPLE_DATE, SAMPLE_TIME).await.unwrap();
    assert_eq!(items.len(), 9);
    assert_eq!(items[0], items[1]);
    assert_eq!(source.batch_sizes(), vec![6]);
}

// ============================================================================
// Regional aggregates
// ============================================================================

#[tokio::test]
async fn test_partial_regional_result_is_retried() {
    let ids = city_ids(6);
    let source = Arc::new(ScriptedWeather::recovering(&ids[2..3]));
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(2));

    let first = resolver
        .resolve_regional(&ids, SAMPLE_DATE, SAMPLE_TIME, Some(50))
        .await
        .unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(source.call_count(), 3);

    // Backend recovered: only the failed chunk is fetched again
    let second = resolver
        .resolve_regional(&ids, SAMPLE_DATE, SAMPLE_TIME, Some(50))
        .await
        .unwrap();
    assert_eq!(second.len(), 6);
    assert_eq!(source.call_count(), 4);

    // Now complete, the aggregate answers without any remote call
    let third = resolver
        .resolve_regional(&ids, SAMPLE_DATE, SAMPLE_TIME, Some(50))
        .await
        .unwrap();
    assert_eq!(third, second);
    assert_eq!(source.call_count(), 4);
}

#[tokio::test]
async fn test_regional_hit_follows_caller_order() {
    let cache = weather_cache().await;
    let ids = city_ids(6);

    let healthy = WeatherResolver::new(cache.clone(), Arc::new(ScriptedWeather::default()), batch(50));
    healthy
        .resolve_regional(&ids, SAMPLE_DATE, SAMPLE_TIME, Some(50))
        .await
        .unwrap();

    // Backend down and per-city entries gone: only the aggregate can answer
    cache.clear_individual().await.unwrap();
    let down = WeatherResolver::new(
        cache.clone(),
        Arc::new(ScriptedWeather {
            fail_all: true,
            ..Default::default()
        }),
        batch(50),
    );
    let mut permuted = ids.clone();
    permuted.reverse();
    permuted.swap(1, 4);

    let items = down
        .resolve_regional(&permuted, SAMPLE_DATE, SAMPLE_TIME, Some(50))
        .await
        .unwrap();

    let returned: Vec<&str> = items.iter().map(|d| d.city_id.as_str()).collect();
    let expected: Vec<&str> = permuted.iter().map(String::as_str).collect();
    assert_eq!(returned, expected);
}

#[tokio::test]
async fn test_resolve_around_covers_neighbors() {
    let cache = weather_cache().await;
    let region = sample_neighbors();
    let source = Arc::new(ScriptedWeather {
        neighbors: Some(region.clone()),
        ..Default::default()
    });
    let resolver = WeatherResolver::new(cache.clone(), source.clone(), batch(50));

    let items = resolver
        .resolve_around(&region.center_city.id, 30, SAMPLE_DATE, SAMPLE_TIME)
        .await
        .unwrap();

    let returned: Vec<String> = items.iter().map(|d| d.city_id.clone()).collect();
    assert_eq!(returned, region.city_ids());
    assert_eq!(returned[0], region.center_city.id);

    // Stored under the radius it was searched with
    let ids = region.city_ids();
    assert!(cache.has_regional(&ids, SAMPLE_DATE, SAMPLE_TIME, Some(30)).await.unwrap());
    assert!(!cache.has_regional(&ids, SAMPLE_DATE, SAMPLE_TIME, Some(50)).await.unwrap());
}

#[tokio::test]
async fn test_resolve_around_fails_when_neighbors_unavailable() {
    let resolver = WeatherResolver::new(
        weather_cache().await,
        Arc::new(ScriptedWeather::default()),
        batch(50),
    );
    let err = resolver
        .resolve_around("3543204", 50, SAMPLE_DATE, SAMPLE_TIME)
        .await
        .unwrap_err();
    assert!(matches!(err, WeatherError::RemoteFetchFailure(_)));
}

#[tokio::test]
async fn test_detailed_fetches_once() {
    let source = Arc::new(ScriptedWeather::default());
    let resolver = WeatherResolver::new(weather_cache().await, source.clone(), batch(50));

    let first = resolver.resolve_detailed("3543204").await.unwrap();
    let second = resolver.resolve_detailed("3543204").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(source.call_count(), 1);
}

// ============================================================================
// Meshes
// ============================================================================

struct ScriptedMeshes {
    missing: HashSet<String>,
    calls: Mutex<usize>,
}

#[async_trait]
impl MeshSource for ScriptedMeshes {
    async fn fetch_meshes(&self, ids: &[String]) -> WeatherResult<HashMap<String, MeshFeature>> {
        *self.calls.lock().unwrap() += 1;
        let found: HashMap<String, MeshFeature> = ids
            .iter()
            .filter(|id| !self.missing.contains(*id))
            .map(|id| (id.clone(), sample_mesh(id)))
            .collect();
        if found.is_empty() {
            return Err(WeatherError::RemoteFetchFailure("no meshes".into()));
        }
        Ok(found)
    }
}

#[tokio::test]
async fn test_mesh_resolver_batches_and_persists_once() {
    let store = Arc::new(ObjectKvStore::in_memory());
    let clock = Arc::new(ManualClock::new(T0));
    let config = CacheConfig::default();
    let cache = Arc::new(MeshCache::new(store.clone(), clock.clone(), &config));
    cache.initialize().await;

    let ids = city_ids(7);
    let source = Arc::new(ScriptedMeshes {
        missing: [ids[2].clone()].into_iter().collect(),
        calls: Mutex::new(0),
    });
    let resolver = MeshResolver::new(cache.clone(), source.clone(), batch(3));

    let meshes = resolver.resolve(&ids).await.unwrap();
    assert_eq!(meshes.len(), 6);
    assert!(!meshes.contains_key(&ids[2]));
    let order: Vec<&String> = meshes.keys().collect();
    let expected: Vec<&String> = ids.iter().filter(|id| **id != ids[2]).collect();
    assert_eq!(order, expected);
    assert_eq!(*source.calls.lock().unwrap(), 3);

    // Metadata was flushed at the end of the batch
    let reopened = MeshCache::new(store, clock, &config);
    reopened.initialize().await;
    assert_eq!(reopened.stats().await.unwrap().entry_count, 6);

    // Second pass only asks for the one that was missing
    resolver.resolve(&ids).await.unwrap();
    assert_eq!(*source.calls.lock().unwrap(), 4);
}

#[tokio::test]
async fn test_mesh_resolver_total_failure() {
    let cache = Arc::new(MeshCache::new(
        Arc::new(ObjectKvStore::in_memory()),
        Arc::new(ManualClock::new(T0)),
        &CacheConfig::default(),
    ));
    cache.initialize().await;

    let ids = city_ids(4);
    let source = Arc::new(ScriptedMeshes {
        missing: ids.iter().cloned().collect(),
        calls: Mutex::new(0),
    });
    let resolver = MeshResolver::new(cache, source, batch(2));

    let err = resolver.resolve(&ids).await.unwrap_err();
    assert!(matches!(
        err,
        WeatherError::AllFetchesFailed {
            requested: 4,
            failed_chunks: 2
        }
    ));
}
