//! Plain-value cloning and byte-size estimation for cache budgets.

use serde::Serialize;
use serde_json::Value;

use weather_common::WeatherResult;

/// Deep-clone a payload into a plain JSON value.
///
/// Every write goes through this before sizing or persisting, so the stored
/// bytes never depend on the in-memory representation of the caller's type.
pub fn to_plain<T: Serialize + ?Sized>(value: &T) -> WeatherResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Serialized byte length of a value (compact JSON).
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> WeatherResult<u64> {
    Ok(serde_json::to_vec(value)?.len() as u64)
}

/// Format a byte count as MiB for logs.
pub fn as_mib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}
