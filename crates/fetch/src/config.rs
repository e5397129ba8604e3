//! Remote endpoint configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

/// Backend URL, IBGE URL, request timeout, batch size and neighbor radius.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Weather backend base URL
    pub api_base_url: String,
    /// IBGE open data base URL
    pub ibge_base_url: String,
    /// Per-request timeout; a timed out request fails its chunk
    pub request_timeout: Duration,
    /// Maximum ids per remote call
    pub max_cities_per_batch: NonZeroUsize,
    /// Neighbor search radius in km when a caller does not give one
    pub default_radius_km: u32,
}

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_IBGE_BASE_URL: &str = "https://servicodados.ibge.gov.br";
pub const DEFAULT_RADIUS_KM: u32 = 50;

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ibge_base_url: DEFAULT_IBGE_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            max_cities_per_batch: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            default_radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

impl FetchConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_base_url = std::env::var("API_BASE_URL").unwrap_or(defaults.api_base_url);

        let ibge_base_url = std::env::var("IBGE_BASE_URL").unwrap_or(defaults.ibge_base_url);

        let request_timeout = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        // Zero is meaningless for a batch size; fall back to the default
        let max_cities_per_batch = std::env::var("MAX_CITIES_PER_BATCH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
            .unwrap_or(defaults.max_cities_per_batch);

        let default_radius_km = std::env::var("NEIGHBOR_RADIUS_KM")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|km| *km > 0)
            .unwrap_or(defaults.default_radius_km);

        Self {
            api_base_url,
            ibge_base_url,
            request_timeout,
            max_cities_per_batch,
            default_radius_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_cities_per_batch.get(), 50);
        assert_eq!(config.default_radius_km, 50);
    }
}
