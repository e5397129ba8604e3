//! Subcommand implementations. Each returns a JSON document for stdout.

use anyhow::{Context as _, Result};
use chrono::Local;
use metrics::gauge;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use fetch::{FetchConfig, HttpWeatherClient, IbgeMeshClient, MeshResolver, WeatherResolver};
use storage::{CacheConfig, ExpirySweeper, MeshCache, WeatherCache};
use weather_common::round_time_to_nearest_3_hours;

pub struct Context {
    pub weather: Arc<WeatherCache>,
    pub mesh: Arc<MeshCache>,
    pub cache_config: CacheConfig,
    pub fetch_config: FetchConfig,
}

/// Fill in today's date and the current time when not given.
fn date_and_time(date: Option<String>, time: Option<String>) -> (String, String) {
    let now = Local::now();
    (
        date.unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
        time.unwrap_or_else(|| now.format("%H:%M").to_string()),
    )
}

impl Context {
    fn weather_resolver(&self) -> Result<WeatherResolver> {
        let client = HttpWeatherClient::from_config(&self.fetch_config)?;
        Ok(WeatherResolver::new(
            self.weather.clone(),
            Arc::new(client),
            self.fetch_config.max_cities_per_batch,
        ))
    }

    pub async fn weather(&self, ids: &[String], date: Option<String>, time: Option<String>) -> Result<Value> {
        let (date, time) = date_and_time(date, time);
        let report = self
            .weather_resolver()?
            .resolve_report(ids, &date, &time)
            .await
            .context("Weather lookup failed")?;

        let failed: Vec<Value> = report
            .failed_chunks
            .iter()
            .map(|f| {
                json!({
                    "chunk": f.index,
                    "ids": f.ids,
                    "error": f.error.to_string(),
                    "retryable": f.error.is_transient(),
                })
            })
            .collect();

        Ok(json!({
            "date": date,
            "bucket": round_time_to_nearest_3_hours(&time)?,
            "fromCache": report.from_cache,
            "fetched": report.fetched,
            "unresolved": report.unresolved,
            "failedChunks": failed,
            "items": report.items,
        }))
    }

    pub async fn regional(
        &self,
        ids: &[String],
        date: Option<String>,
        time: Option<String>,
        radius: Option<u32>,
    ) -> Result<Value> {
        let (date, time) = date_and_time(date, time);
        let items = self
            .weather_resolver()?
            .resolve_regional(ids, &date, &time, radius)
            .await
            .context("Regional lookup failed")?;
        Ok(serde_json::to_value(items)?)
    }

    pub async fn around(
        &self,
        center: &str,
        date: Option<String>,
        time: Option<String>,
        radius: Option<u32>,
    ) -> Result<Value> {
        let (date, time) = date_and_time(date, time);
        let radius = radius.unwrap_or(self.fetch_config.default_radius_km);
        let items = self
            .weather_resolver()?
            .resolve_around(center, radius, &date, &time)
            .await
            .with_context(|| format!("Regional lookup around {} failed", center))?;
        Ok(serde_json::to_value(items)?)
    }

    pub async fn detailed(&self, id: &str) -> Result<Value> {
        let data = self
            .weather_resolver()?
            .resolve_detailed(id)
            .await
            .with_context(|| format!("Detailed lookup failed for {}", id))?;
        Ok(serde_json::to_value(data)?)
    }

    pub async fn mesh(&self, ids: &[String]) -> Result<Value> {
        let client = IbgeMeshClient::from_config(&self.fetch_config)?;
        let resolver = MeshResolver::new(
            self.mesh.clone(),
            Arc::new(client),
            self.fetch_config.max_cities_per_batch,
        );

        let meshes = resolver.resolve(ids).await.context("Mesh lookup failed")?;
        let features: Vec<Value> = meshes.into_values().map(|feature| feature.0).collect();

        Ok(json!({
            "type": "FeatureCollection",
            "features": features,
        }))
    }

    pub async fn stats(&self) -> Result<Value> {
        let weather = self.weather.stats().await?;
        let mesh = self.mesh.stats().await?;

        gauge!("cache_total_size_bytes", "domain" => "weather").set(weather.usage.total_size as f64);
        gauge!("cache_total_size_bytes", "domain" => "mesh").set(mesh.total_size as f64);

        Ok(json!({ "weather": weather, "mesh": mesh }))
    }

    fn sweeper(&self, interval: Duration) -> ExpirySweeper {
        ExpirySweeper::new(interval)
            .with_target(self.weather.clone())
            .with_target(self.mesh.clone())
    }

    pub async fn sweep(&self) -> Result<Value> {
        let report = self.sweeper(self.cache_config.sweep_interval()).run_once().await;
        Ok(serde_json::to_value(report)?)
    }

    pub async fn clear(&self, individual: bool, regional: bool, mesh: bool) -> Result<Value> {
        if individual {
            let removed = self.weather.clear_individual().await?;
            return Ok(json!({ "cleared": "individual", "entries": removed }));
        }
        if regional {
            let removed = self.weather.clear_regional().await?;
            return Ok(json!({ "cleared": "regional", "entries": removed }));
        }
        if mesh {
            self.mesh.clear().await?;
            return Ok(json!({ "cleared": "mesh" }));
        }

        self.weather.clear().await?;
        self.mesh.clear().await?;
        Ok(json!({ "cleared": "all" }))
    }

    pub async fn watch(&self, interval: Option<u64>) -> Result<Value> {
        let interval = interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.cache_config.sweep_interval());

        let handle = self.sweeper(interval).spawn();
        info!(interval_secs = interval.as_secs(), "Watching caches, Ctrl+C to stop");

        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        handle.abort();

        // Persist whatever the last cycle touched
        self.weather.flush().await?;
        self.mesh.flush().await?;
        self.stats().await
    }
}
