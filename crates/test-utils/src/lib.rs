//! Shared test utilities for the topoviz workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic DEM generators
//! - Fixture writers for workflow documents and raster files
//! - Approximate and NaN-aware comparison macros
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
//! use test_utils::{cone_dem, assert_approx_eq};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for elementwise comparison of two `f32` arrays where NaN matches NaN.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_nan_aware_eq;
///
/// assert_nan_aware_eq!(result.view(), expected.view(), 1e-6);
/// ```
#[macro_export]
macro_rules! assert_nan_aware_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {
        match (&$left, &$right) { (left, right) => {
        assert_eq!(left.dim(), right.dim(), "assertion failed: shapes differ");
        for ((idx, l), r) in left.indexed_iter().zip(right.iter()) {
            let l: f64 = *l as f64;
            let r: f64 = *r as f64;
            if l.is_nan() || r.is_nan() {
                if !(l.is_nan() && r.is_nan()) {
                    panic!(
                        "assertion failed: NaN mismatch at {:?}: left `{:?}`, right `{:?}`",
                        idx, l, r
                    );
                }
                continue;
            }
            if (l - r).abs() > $epsilon as f64 {
                panic!(
                    "assertion failed: `(left ≈ right)` at {:?}: left `{:?}`, right `{:?}`",
                    idx, l, r
                );
            }
        }
        }}
    };
}
