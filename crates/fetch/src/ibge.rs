//! IBGE municipality mesh client.
//!
//! The malhas API serves one municipality per request, so a batch issues one
//! request per id concurrently. Individual failures are logged and skipped.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{instrument, warn};

use weather_common::{MeshFeature, WeatherError, WeatherResult};

use crate::config::FetchConfig;
use crate::http::map_request_error;
use crate::remote::MeshSource;

const GEOJSON_FORMAT: &str = "application/vnd.geo+json";

pub struct IbgeMeshClient {
    client: Client,
    base_url: String,
}

impl IbgeMeshClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> WeatherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FetchConfig) -> WeatherResult<Self> {
        Self::new(config.ibge_base_url.clone(), config.request_timeout)
    }

    /// Boundary for a single municipality.
    pub async fn fetch_mesh(&self, municipality_id: &str) -> WeatherResult<MeshFeature> {
        let url = format!("{}/api/v3/malhas/municipios/{}", self.base_url, municipality_id);

        let response = self
            .client
            .get(&url)
            .query(&[("formato", GEOJSON_FORMAT)])
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::RemoteFetchFailure(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        response
            .json::<MeshFeature>()
            .await
            .map_err(|e| WeatherError::RemoteFetchFailure(format!("Invalid GeoJSON from {}: {}", url, e)))
    }
}

#[async_trait]
impl MeshSource for IbgeMeshClient {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_meshes(&self, ids: &[String]) -> WeatherResult<HashMap<String, MeshFeature>> {
        let results = join_all(ids.iter().map(|id| self.fetch_mesh(id))).await;

        let mut meshes = HashMap::with_capacity(ids.len());
        let mut last_error = None;

        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(feature) => {
                    meshes.insert(id.clone(), feature);
                }
                Err(e) => {
                    warn!(municipality = %id, error = %e, "Failed to fetch municipality mesh");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if meshes.is_empty() => Err(e),
            _ => Ok(meshes),
        }
    }
}
