//! Cache key derivation.
//!
//! Keys are pure functions of their inputs. Weather keys carry the date and
//! the 3-hour time bucket so nearby requests share an entry:
//!
//! - single city: `{cityId}_{date}_{bucket}` (e.g. `3550308_2025-11-21_15:00`)
//! - regional: `regional_{sorted ids joined by '-'}_{date}_{bucket}[_{radius}]`
//! - detailed: `detailed_{cityId}`
//! - mesh: `{municipalityId}`

use weather_common::{TimeBucket, WeatherResult};

pub const REGIONAL_PREFIX: &str = "regional_";
pub const DETAILED_PREFIX: &str = "detailed_";

/// Key for one city's weather at a date/time.
pub fn derive_entity_key(entity_id: &str, date: &str, time: &str) -> WeatherResult<String> {
    let bucket = TimeBucket::from_hhmm(time)?;
    Ok(format!("{}_{}_{}", entity_id, date, bucket))
}

/// Key for a multi-city request. Permutations of the same id set collide.
pub fn derive_regional_key<S: AsRef<str>>(
    entity_ids: &[S],
    date: &str,
    time: &str,
    radius: Option<u32>,
) -> WeatherResult<String> {
    let bucket = TimeBucket::from_hhmm(time)?;

    let mut sorted: Vec<&str> = entity_ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let radius_part = radius.map(|r| format!("_{}", r)).unwrap_or_default();
    Ok(format!(
        "{}{}_{}_{}{}",
        REGIONAL_PREFIX,
        sorted.join("-"),
        date,
        bucket,
        radius_part
    ))
}

/// Mesh geometry has no time dimension.
pub fn derive_mesh_key(entity_id: &str) -> String {
    entity_id.to_string()
}

/// Key for the detailed (single city, longer TTL) weather view.
pub fn derive_detailed_key(entity_id: &str) -> String {
    format!("{}{}", DETAILED_PREFIX, entity_id)
}

/// Which namespace a weather key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Individual,
    Regional,
    Detailed,
}

impl KeyKind {
    pub fn classify(key: &str) -> Self {
        if key.starts_with(REGIONAL_PREFIX) {
            KeyKind::Regional
        } else if key.starts_with(DETAILED_PREFIX) {
            KeyKind::Detailed
        } else {
            KeyKind::Individual
        }
    }
}
