//! Shared test utilities for the WorldPop retrieval workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A synthetic WorldPop catalog (CSV and published hash)
//! - Country extents for spatial country selection
//! - Raster data and download payload generators
//! - Pixel buffer assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Assert that two pixel buffers match within `epsilon`, treating NaN as equal to NaN.
///
/// ```ignore
/// use test_utils::assert_pixels_approx_eq;
///
/// assert_pixels_approx_eq!(&[1.0001, f32::NAN], &[1.0, f32::NAN], 0.001);
/// ```
#[macro_export]
macro_rules! assert_pixels_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let actual: &[f32] = &$actual[..];
        let expected: &[f32] = &$expected[..];
        let epsilon = $epsilon as f32;
        assert_eq!(actual.len(), expected.len(), "pixel count differs");
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            let same = (a.is_nan() && e.is_nan()) || (a - e).abs() <= epsilon;
            if !same {
                panic!("pixel {i} differs: actual {a}, expected {e} (epsilon {epsilon})");
            }
        }
    }};
}
