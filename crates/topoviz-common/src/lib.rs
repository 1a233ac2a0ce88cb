//! Common types and numeric kernels shared across the topoviz crates.
//!
//! - [`RasterGrid`]: the georeferenced raster a map layer wraps
//! - [`filter`]: NaN-aware Gaussian smoothing
//! - [`shade`]: hillshade illumination
//! - [`TopovizError`]: the error taxonomy used by every crate

pub mod error;
pub mod extent;
pub mod filter;
pub mod grid;
pub mod shade;

pub use error::{Result, TopovizError};
pub use extent::Extent;
pub use filter::{gaussian_filter, nan_gaussian_smooth, validate_sigma, BoundaryMode};
pub use grid::RasterGrid;
pub use shade::HillshadeOptions;
