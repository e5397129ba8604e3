//! Error types for the weather cache and fetch layers.

use thiserror::Error;

/// Result type alias using WeatherError.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// Primary error type for cache and fetch operations.
#[derive(Debug, Error)]
pub enum WeatherError {
    // === Key Derivation Errors ===
    #[error("Invalid time format '{0}': expected HH:MM")]
    InvalidTimeFormat(String),

    // === Cache Errors ===
    #[error("Cache '{0}' used before initialize() completed")]
    NotInitialized(&'static str),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    // === Remote Errors ===
    #[error("Remote fetch failed: {0}")]
    RemoteFetchFailure(String),

    #[error("All fetches failed: none of {requested} requested ids could be resolved ({failed_chunks} chunk(s) failed)")]
    AllFetchesFailed { requested: usize, failed_chunks: usize },

    #[error("Request timeout")]
    Timeout,

    // === Infrastructure Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WeatherError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            WeatherError::InvalidTimeFormat(_) => "InvalidTimeFormat",
            WeatherError::NotInitialized(_) => "NotInitialized",
            WeatherError::StorageFailure(_) => "StorageFailure",
            WeatherError::RemoteFetchFailure(_) | WeatherError::Timeout => "RemoteFetchFailure",
            WeatherError::AllFetchesFailed { .. } => "AllFetchesFailed",
            WeatherError::InvalidConfig(_) => "InvalidConfig",
            WeatherError::InternalError(_) => "InternalError",
        }
    }

    /// Whether this error comes from the remote boundary and a later attempt
    /// may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WeatherError::RemoteFetchFailure(_)
                | WeatherError::Timeout
                | WeatherError::AllFetchesFailed { .. }
                | WeatherError::StorageFailure(_)
        )
    }
}

impl From<std::io::Error> for WeatherError {
    fn from(err: std::io::Error) -> Self {
        WeatherError::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(err: serde_json::Error) -> Self {
        WeatherError::InternalError(format!("JSON error: {}", err))
    }
}
