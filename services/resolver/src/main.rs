//! Rainmap cache resolver.
//!
//! Resolves weather payloads and municipality meshes through the persistent
//! caches, and exposes cache maintenance:
//! - Cache-first weather lookups with chunked remote fetches
//! - Mesh lookups against the IBGE malhas API
//! - Stats, expiry sweeps and selective clears
//! - A long-running watch mode with a periodic expiry sweeper

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fetch::FetchConfig;
use storage::{CacheConfig, MeshCache, ObjectKvStore, WeatherCache};
use weather_common::SystemClock;

use commands::Context as CommandContext;

#[derive(Parser, Debug)]
#[command(name = "rainmap-resolver")]
#[command(about = "Cache-first weather and mesh resolver")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// YAML cache configuration (budgets, TTLs, backend)
    #[arg(long, env = "CACHE_CONFIG")]
    cache_config: Option<PathBuf>,

    /// Weather backend base URL
    #[arg(long, env = "API_BASE_URL")]
    api_base_url: Option<String>,

    /// IBGE open data base URL
    #[arg(long, env = "IBGE_BASE_URL")]
    ibge_base_url: Option<String>,

    /// Maximum ids per remote request
    #[arg(long, env = "MAX_CITIES_PER_BATCH")]
    max_batch: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Weather for a list of cities
    Weather {
        /// Comma-separated IBGE city ids
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Time (HH:MM), defaults to now
        #[arg(long)]
        time: Option<String>,
    },
    /// Regional aggregate for a set of cities, or for a city and its neighbors
    Regional {
        #[arg(long, value_delimiter = ',', required_unless_present = "center", conflicts_with = "center")]
        ids: Vec<String>,
        /// Center city; the region is every municipality within `--radius`
        #[arg(long)]
        center: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        time: Option<String>,
        /// Search radius in km, part of the cache key
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        radius: Option<u32>,
    },
    /// Detailed weather for one city
    Detailed {
        #[arg(long)]
        id: String,
    },
    /// Municipality boundaries as GeoJSON
    Mesh {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
    },
    /// Cache usage for both domains
    Stats,
    /// Delete expired entries now
    Sweep,
    /// Clear cached entries (everything unless narrowed)
    Clear {
        /// Only single-city weather entries
        #[arg(long, conflicts_with_all = ["regional", "mesh"])]
        individual: bool,
        /// Only regional weather aggregates
        #[arg(long, conflicts_with = "mesh")]
        regional: bool,
        /// Only meshes
        #[arg(long)]
        mesh: bool,
    },
    /// Run the expiry sweeper until interrupted
    Watch {
        /// Sweep interval in seconds (defaults to the cache config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

fn init_tracing(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_cache_config(path: Option<&PathBuf>) -> Result<CacheConfig> {
    let config = match path {
        Some(path) => CacheConfig::load(path)?.with_env_overrides(),
        None => CacheConfig::from_env(),
    };
    config.validate()?;
    Ok(config)
}

fn load_fetch_config(args: &Args) -> FetchConfig {
    let mut config = FetchConfig::from_env();
    if let Some(url) = &args.api_base_url {
        config.api_base_url = url.clone();
    }
    if let Some(url) = &args.ibge_base_url {
        config.ibge_base_url = url.clone();
    }
    if let Some(batch) = args.max_batch.and_then(std::num::NonZeroUsize::new) {
        config.max_cities_per_batch = batch;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let cache_config = load_cache_config(args.cache_config.as_ref())?;
    let fetch_config = load_fetch_config(&args);

    let store = Arc::new(
        ObjectKvStore::from_backend(&cache_config.backend).context("Failed to open cache store")?,
    );
    let clock = Arc::new(SystemClock);

    let weather = Arc::new(WeatherCache::new(store.clone(), clock.clone(), &cache_config));
    let mesh = Arc::new(MeshCache::new(store, clock, &cache_config));
    weather.initialize().await;
    mesh.initialize().await;

    info!(backend = ?cache_config.backend, "Caches ready");

    let ctx = CommandContext {
        weather,
        mesh,
        cache_config,
        fetch_config,
    };

    let output = match args.command {
        Command::Weather { ids, date, time } => ctx.weather(&ids, date, time).await?,
        Command::Regional {
            ids,
            center,
            date,
            time,
            radius,
        } => match center {
            Some(center) => ctx.around(&center, date, time, radius).await?,
            None => ctx.regional(&ids, date, time, radius).await?,
        },
        Command::Detailed { id } => ctx.detailed(&id).await?,
        Command::Mesh { ids } => ctx.mesh(&ids).await?,
        Command::Stats => ctx.stats().await?,
        Command::Sweep => ctx.sweep().await?,
        Command::Clear {
            individual,
            regional,
            mesh,
        } => ctx.clear(individual, regional, mesh).await?,
        Command::Watch { interval } => ctx.watch(interval).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.print_metrics {
        eprintln!("{}", prometheus_handle.render());
    }

    Ok(())
}
