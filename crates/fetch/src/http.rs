//! HTTP client for the weather backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use weather_common::{
    NeighborCitiesResponse, RegionalWeatherRequest, WeatherData, WeatherError, WeatherResult,
};

use crate::config::FetchConfig;
use crate::remote::WeatherSource;

pub struct HttpWeatherClient {
    client: Client,
    base_url: String,
}

impl HttpWeatherClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> WeatherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| WeatherError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FetchConfig) -> WeatherResult<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout)
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> WeatherResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::RemoteFetchFailure(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| WeatherError::RemoteFetchFailure(format!("Invalid response from {}: {}", url, e)))
    }
}

/// Timeouts get their own variant; everything else is a fetch failure.
pub(crate) fn map_request_error(url: &str, err: reqwest::Error) -> WeatherError {
    if err.is_timeout() {
        WeatherError::Timeout
    } else {
        WeatherError::RemoteFetchFailure(format!("Request to {} failed: {}", url, err))
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherClient {
    #[instrument(skip(self))]
    async fn fetch_city(&self, city_id: &str) -> WeatherResult<WeatherData> {
        let url = format!("{}/api/weather/city/{}", self.base_url, city_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        Self::decode(&url, response).await
    }

    #[instrument(skip(self, city_ids), fields(count = city_ids.len()))]
    async fn fetch_regional(
        &self,
        city_ids: &[String],
        date: &str,
        time: &str,
    ) -> WeatherResult<Vec<WeatherData>> {
        let url = format!("{}/api/weather/regional", self.base_url);
        let body = RegionalWeatherRequest {
            city_ids: city_ids.to_vec(),
            date: Some(date.to_string()),
            time: Some(time.to_string()),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let items: Vec<WeatherData> = Self::decode(&url, response).await?;
        debug!(requested = city_ids.len(), received = items.len(), "Regional weather fetched");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn neighbors(&self, center_id: &str, radius_km: u32) -> WeatherResult<NeighborCitiesResponse> {
        let url = format!("{}/api/cities/neighbors/{}", self.base_url, center_id);

        let response = self
            .client
            .get(&url)
            .query(&[("radius", radius_km)])
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let found: NeighborCitiesResponse = Self::decode(&url, response).await?;
        debug!(neighbors = found.neighbors.len(), "Neighbor cities fetched");
        Ok(found)
    }
}
