//! Common types and utilities shared across the rainmap cache crates.

pub mod error;
pub mod time;
pub mod types;

pub use error::{WeatherError, WeatherResult};
pub use time::{is_valid, round_time_to_nearest_3_hours, Clock, ManualClock, SystemClock, TimeBucket};
pub use types::{
    CenterCity, MeshFeature, NeighborCitiesResponse, NeighborCity, RegionalWeatherRequest, WeatherAlert,
    WeatherData,
};
