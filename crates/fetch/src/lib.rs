//! Cache-first resolution of weather payloads and municipality meshes.
//!
//! Ids missing from the cache are split into bounded chunks and fetched
//! concurrently; one failing chunk never cancels or fails its siblings.

pub mod chunk;
pub mod config;
pub mod http;
pub mod ibge;
pub mod orchestrator;
pub mod remote;

pub use chunk::{chunk_ids, fetch_in_chunks, ChunkFailure, ChunkedOutcome};
pub use config::FetchConfig;
pub use http::HttpWeatherClient;
pub use ibge::IbgeMeshClient;
pub use orchestrator::{MeshResolver, ResolveReport, WeatherResolver};
pub use remote::{MeshSource, WeatherSource};
