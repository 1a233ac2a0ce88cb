//! Raster grid wrapped by map layers.

use ndarray::Array2;

use crate::error::{Result, TopovizError};
use crate::extent::Extent;
use crate::shade::{self, HillshadeOptions};

/// A georeferenced 2D raster of cell values (typically elevation).
///
/// Rows run north to south, columns west to east.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    /// Cell values in row-major order
    z: Array2<f32>,
    /// Cell size in projection units
    cellsize: f64,
    /// Outer edges of the grid
    extent: Extent,
}

impl RasterGrid {
    /// Create a grid anchored at the origin.
    pub fn new(z: Array2<f32>, cellsize: f64) -> Self {
        let (rows, cols) = z.dim();
        Self {
            z,
            cellsize,
            extent: Extent::from_shape(rows, cols, cellsize),
        }
    }

    /// Create a grid with an explicit extent.
    pub fn with_extent(z: Array2<f32>, cellsize: f64, extent: Extent) -> Self {
        Self {
            z,
            cellsize,
            extent,
        }
    }

    /// Build a grid from nested rows, as found in JSON documents.
    pub fn from_rows(rows: &[Vec<f64>], cellsize: f64) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != ncols) {
            return Err(TopovizError::invalid_parameter(
                "values",
                "rows must all have the same length",
            ));
        }
        let flat: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
        let z = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| TopovizError::invalid_parameter("values", e.to_string()))?;
        Ok(Self::new(z, cellsize))
    }

    /// Raw cell values.
    pub fn z(&self) -> &Array2<f32> {
        &self.z
    }

    pub fn cellsize(&self) -> f64 {
        self.cellsize
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.z.dim()
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Mean of the finite cells, if any.
    pub fn finite_mean(&self) -> Option<f32> {
        let (sum, count) = self
            .z
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
        (count > 0).then(|| (sum / count as f64) as f32)
    }

    /// A grid with the same georeferencing and new data of identical shape.
    pub fn duplicate_with_new_data(&self, z: Array2<f32>) -> Result<Self> {
        if z.dim() != self.z.dim() {
            return Err(TopovizError::ShapeMismatch {
                expected: self.z.dim(),
                actual: z.dim(),
            });
        }
        Ok(Self {
            z,
            cellsize: self.cellsize,
            extent: self.extent,
        })
    }

    /// Illumination intensity grid for the given light parameters.
    pub fn hillshade(&self, opts: &HillshadeOptions) -> Self {
        Self {
            z: shade::hillshade(&self.z, self.cellsize, opts),
            cellsize: self.cellsize,
            extent: self.extent,
        }
    }
}
