//! Payload types exchanged with the weather API and the IBGE mesh API.

use serde::{Deserialize, Serialize};

/// Weather conditions for a single municipality, as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    /// IBGE municipality code (e.g. "3543204")
    pub city_id: String,
    pub city_name: String,
    /// ISO 8601 observation/forecast time, passed through as sent by the backend
    pub timestamp: String,
    /// Rainfall intensity on a 0-100 scale
    pub rainfall_intensity: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_alert: Option<Vec<WeatherAlert>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl WeatherData {
    /// Whether any alert with the given severity is attached.
    pub fn has_alert(&self, severity: &str) -> bool {
        self.weather_alert
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|alert| alert.severity == severity)
    }
}

/// Alert attached to a weather payload (e.g. `HEAVY_RAIN`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlert {
    pub code: String,
    pub severity: String,
    pub description: String,
    pub timestamp: String,
}

/// Request body for the regional weather endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalWeatherRequest {
    pub city_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Municipality at the center of a neighbor search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterCity {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Municipality within the search radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborCity {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance from the center in km
    pub distance: f64,
}

/// Response of the neighbor cities endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborCitiesResponse {
    pub center_city: CenterCity,
    #[serde(default)]
    pub neighbors: Vec<NeighborCity>,
}

impl NeighborCitiesResponse {
    /// Center id followed by neighbor ids, nearest first, without repeats.
    pub fn city_ids(&self) -> Vec<String> {
        let mut neighbors: Vec<&NeighborCity> = self.neighbors.iter().collect();
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let mut ids = vec![self.center_city.id.clone()];
        for neighbor in neighbors {
            if !ids.contains(&neighbor.id) {
                ids.push(neighbor.id.clone());
            }
        }
        ids
    }
}

/// GeoJSON polygon feature for a municipality boundary.
///
/// Kept as raw GeoJSON so the map layer receives exactly what IBGE served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshFeature(pub serde_json::Value);

impl MeshFeature {
    /// GeoJSON `type` member ("Feature", "FeatureCollection", ...).
    pub fn geojson_type(&self) -> Option<&str> {
        self.0.get("type").and_then(|t| t.as_str())
    }

    /// Geometry type of the feature, or of the first feature in a collection.
    pub fn geometry_type(&self) -> Option<&str> {
        let feature = match self.geojson_type() {
            Some("FeatureCollection") => self.0.get("features")?.get(0)?,
            _ => &self.0,
        };
        feature.get("geometry")?.get("type")?.as_str()
    }
}
