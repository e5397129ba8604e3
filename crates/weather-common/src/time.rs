//! Time handling utilities for cache keys and entry expiry.

use chrono::{NaiveTime, Timelike, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::{WeatherError, WeatherResult};

/// Width of a forecast time bucket in minutes (3 hours).
pub const BUCKET_MINUTES: u32 = 180;

/// A wall-clock time rounded to a 3-hour forecast window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeBucket {
    hour: u32,
}

impl TimeBucket {
    /// Parse an `HH:MM` string and round it to the nearest bucket.
    ///
    /// Rounds half-up at the 1.5 hour midpoint and wraps 24:00 back to 00:00.
    pub fn from_hhmm(time: &str) -> WeatherResult<Self> {
        let parsed = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|_| WeatherError::InvalidTimeFormat(time.to_string()))?;

        let minutes = parsed.hour() * 60 + parsed.minute();
        let bucket = (minutes + BUCKET_MINUTES / 2) / BUCKET_MINUTES;
        let hour = (bucket * BUCKET_MINUTES / 60) % 24;

        Ok(Self { hour })
    }

    /// Bucket start hour (0, 3, 6, ... 21).
    pub fn hour(&self) -> u32 {
        self.hour
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00", self.hour)
    }
}

/// Round an `HH:MM` time to the nearest 3-hour boundary, e.g. `"14:30"` -> `"15:00"`.
pub fn round_time_to_nearest_3_hours(time: &str) -> WeatherResult<String> {
    TimeBucket::from_hhmm(time).map(|bucket| bucket.to_string())
}

/// Whether an entry written at `timestamp_ms` is still fresh at `now_ms`.
///
/// Shared by lazy expiry on read and the background sweep.
pub fn is_valid(timestamp_ms: i64, ttl: Duration, now_ms: i64) -> bool {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(timestamp_ms) < ttl_ms
}

/// Source of "now" for cache timestamps, in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic expiry tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_examples() {
        assert_eq!(round_time_to_nearest_3_hours("13:00").unwrap(), "12:00");
        assert_eq!(round_time_to_nearest_3_hours("14:30").unwrap(), "15:00");
        assert_eq!(round_time_to_nearest_3_hours("23:00").unwrap(), "00:00");
    }

    #[test]
    fn test_midpoint_rounds_up() {
        assert_eq!(round_time_to_nearest_3_hours("13:30").unwrap(), "15:00");
        assert_eq!(round_time_to_nearest_3_hours("13:29").unwrap(), "12:00");
        assert_eq!(round_time_to_nearest_3_hours("22:30").unwrap(), "00:00");
    }

    #[test]
    fn test_is_valid_boundary() {
        let ttl = Duration::from_secs(60);
        assert!(is_valid(0, ttl, 59_999));
        assert!(!is_valid(0, ttl, 60_000));
        assert!(!is_valid(0, ttl, 60_001));
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_millis(), 42);
    }
}
