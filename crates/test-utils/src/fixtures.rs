//! Common test fixtures for rainmap tests.
//!
//! Payloads are deterministic functions of the municipality id so tests can
//! compare what came back from a cache or a mock server against a fresh copy.

use serde_json::json;
use weather_common::{
    CenterCity, MeshFeature, NeighborCitiesResponse, NeighborCity, WeatherAlert, WeatherData,
};

/// Well-known IBGE municipality codes.
pub mod cities {
    pub const SAO_PAULO: &str = "3550308";
    pub const RIBEIRAO_DO_SUL: &str = "3543204";
    pub const CAMPINAS: &str = "3509502";
    pub const RIO_DE_JANEIRO: &str = "3304557";
    pub const BELO_HORIZONTE: &str = "3106200";
}

pub const SAMPLE_DATE: &str = "2025-11-21";
pub const SAMPLE_TIME: &str = "15:00";

/// Weather payload for a city with values derived from its id.
pub fn sample_weather(city_id: &str) -> WeatherData {
    let seed = city_id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    WeatherData {
        city_id: city_id.to_string(),
        city_name: format!("Municipio {}", city_id),
        timestamp: format!("{}T{}:00Z", SAMPLE_DATE, SAMPLE_TIME),
        rainfall_intensity: (seed % 101) as f64,
        temperature: 15.0 + (seed % 20) as f64,
        humidity: 40.0 + (seed % 60) as f64,
        wind_speed: (seed % 40) as f64,
        weather_alert: None,
        description: None,
        feels_like: None,
        pressure: None,
        visibility: None,
    }
}

/// Weather payload carrying a heavy rain alert and the optional fields.
pub fn sample_weather_with_alert(city_id: &str) -> WeatherData {
    WeatherData {
        rainfall_intensity: 95.0,
        weather_alert: Some(vec![WeatherAlert {
            code: "HEAVY_RAIN".to_string(),
            severity: "high".to_string(),
            description: "Chuva forte".to_string(),
            timestamp: format!("{}T{}:00Z", SAMPLE_DATE, SAMPLE_TIME),
        }]),
        description: Some("Tempestade".to_string()),
        feels_like: Some(27.5),
        pressure: Some(1008.0),
        visibility: Some(2000.0),
        ..sample_weather(city_id)
    }
}

/// Minimal GeoJSON polygon feature for a municipality.
pub fn sample_mesh(municipality_id: &str) -> MeshFeature {
    MeshFeature(json!({
        "type": "Feature",
        "properties": { "codarea": municipality_id },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [-47.9, -21.1],
                [-47.7, -21.1],
                [-47.7, -21.3],
                [-47.9, -21.3],
                [-47.9, -21.1]
            ]]
        }
    }))
}

/// Mesh feature padded to roughly `bytes` of serialized JSON.
pub fn sized_mesh(municipality_id: &str, bytes: usize) -> MeshFeature {
    MeshFeature(json!({
        "type": "Feature",
        "properties": { "codarea": municipality_id, "pad": "x".repeat(bytes) },
        "geometry": null
    }))
}

/// Neighbor search around Ribeirão do Sul, listed out of distance order.
pub fn sample_neighbors() -> NeighborCitiesResponse {
    let neighbor = |id: &str, name: &str, latitude: f64, longitude: f64, distance: f64| NeighborCity {
        id: id.to_string(),
        name: name.to_string(),
        latitude,
        longitude,
        distance,
    };

    NeighborCitiesResponse {
        center_city: CenterCity {
            id: cities::RIBEIRAO_DO_SUL.to_string(),
            name: "Ribeirão do Sul".to_string(),
            latitude: -22.7572,
            longitude: -49.9439,
        },
        neighbors: vec![
            neighbor("3534708", "Ourinhos", -22.9789, -49.8708, 24.5),
            neighbor("3550506", "São Pedro do Turvo", -22.8978, -49.7433, 17.8),
            neighbor("3510153", "Canitar", -23.0028, -49.7817, 30.1),
            neighbor("3545407", "Salto Grande", -22.8936, -49.9853, 18.2),
        ],
    }
}
