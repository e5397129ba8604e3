//! Remote data sources behind the resolvers.

use async_trait::async_trait;
use std::collections::HashMap;

use weather_common::{MeshFeature, NeighborCitiesResponse, WeatherData, WeatherResult};

/// Weather backend.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Current conditions for one city.
    async fn fetch_city(&self, city_id: &str) -> WeatherResult<WeatherData>;

    /// Conditions for a batch of cities at a date/time. May return fewer
    /// items than requested; order is not significant.
    async fn fetch_regional(
        &self,
        city_ids: &[String],
        date: &str,
        time: &str,
    ) -> WeatherResult<Vec<WeatherData>>;

    /// Municipalities within `radius_km` of `center_id`, center included.
    async fn neighbors(&self, center_id: &str, radius_km: u32) -> WeatherResult<NeighborCitiesResponse>;
}

/// Municipality boundary provider.
#[async_trait]
pub trait MeshSource: Send + Sync {
    /// Boundaries for a batch of ids, keyed by id. Ids that could not be
    /// fetched are absent; an error means nothing in the batch was fetched.
    async fn fetch_meshes(&self, ids: &[String]) -> WeatherResult<HashMap<String, MeshFeature>>;
}
