//! Shared test utilities for the rainmap workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Weather and mesh payload fixtures
//! - Municipality id generators
//! - A float comparison macro for usage percentages
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{sample_weather, city_ids};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Assert two numbers are within `epsilon` of each other, e.g. a cache
/// usage percentage computed from byte counts.
///
/// ```
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(37.5, 300.0 / 800.0 * 100.0, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let (actual, expected) = ($actual as f64, $expected as f64);
        let epsilon = $epsilon as f64;
        assert!(
            (actual - expected).abs() <= epsilon,
            "{} = {} is not within {} of {}",
            stringify!($actual),
            actual,
            epsilon,
            expected
        );
    }};
}
