//! Cache configuration: size budgets, TTLs, sweep cadence and store backend.
//!
//! Loaded from a YAML file, from environment variables, or both (file first,
//! environment overrides on top).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use weather_common::{WeatherError, WeatherResult};

/// Where cache entries and metadata are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit
    Memory,
    /// Local directory, survives restarts
    Filesystem { root: PathBuf },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Memory
    }
}

/// Budget and TTL for one cache domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DomainConfig {
    pub budget_bytes: u64,
    pub ttl_secs: u64,
}

impl DomainConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_weather")]
    pub weather: DomainConfig,
    /// Detailed weather shares the weather budget but lives longer
    #[serde(default = "default_detailed_ttl")]
    pub detailed_ttl_secs: u64,
    #[serde(default = "default_mesh")]
    pub mesh: DomainConfig,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_weather() -> DomainConfig {
    DomainConfig {
        budget_bytes: 5 * 1024 * 1024, // 5 MiB
        ttl_secs: 30 * 60,             // 30 minutes
    }
}

fn default_detailed_ttl() -> u64 {
    60 * 60 // 60 minutes
}

fn default_mesh() -> DomainConfig {
    DomainConfig {
        budget_bytes: 10 * 1024 * 1024, // 10 MiB
        ttl_secs: 7 * 24 * 60 * 60,     // 7 days
    }
}

fn default_sweep_interval() -> u64 {
    15 * 60 // 15 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            weather: default_weather(),
            detailed_ttl_secs: default_detailed_ttl(),
            mesh: default_mesh(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache config: {}", path.display()))?;

        let config: CacheConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse cache config: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid cache config: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded cache config");
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `WEATHER_CACHE_BUDGET_BYTES`, `WEATHER_TTL_SECS`, `CACHE_DIR`, etc.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_u64("WEATHER_CACHE_BUDGET_BYTES") {
            self.weather.budget_bytes = v;
        }
        if let Some(v) = env_u64("WEATHER_TTL_SECS") {
            self.weather.ttl_secs = v;
        }
        if let Some(v) = env_u64("DETAILED_WEATHER_TTL_SECS") {
            self.detailed_ttl_secs = v;
        }
        if let Some(v) = env_u64("MESH_CACHE_BUDGET_BYTES") {
            self.mesh.budget_bytes = v;
        }
        if let Some(v) = env_u64("MESH_TTL_SECS") {
            self.mesh.ttl_secs = v;
        }
        if let Some(v) = env_u64("CACHE_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = v;
        }
        if let Ok(dir) = std::env::var("CACHE_DIR") {
            if !dir.trim().is_empty() {
                self.backend = StoreBackend::Filesystem {
                    root: PathBuf::from(dir),
                };
            }
        }
        self
    }

    /// Reject zero periods: a zero TTL expires every entry on write and a
    /// zero sweep interval cannot drive a ticker.
    pub fn validate(&self) -> WeatherResult<()> {
        let periods = [
            ("weather.ttl_secs", self.weather.ttl_secs),
            ("detailed_ttl_secs", self.detailed_ttl_secs),
            ("mesh.ttl_secs", self.mesh.ttl_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (name, secs) in periods {
            if secs == 0 {
                return Err(WeatherError::InvalidConfig(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }

    pub fn detailed_ttl(&self) -> Duration {
        Duration::from_secs(self.detailed_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
