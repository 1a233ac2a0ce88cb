//! Rectangular spatial extent of a raster grid.

use serde::{Deserialize, Serialize};

/// Spatial extent of a grid in projected units, ordered like the
/// `(xmin, xmax, ymin, ymax)` tuple image renderers expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    /// Create a new extent from its edges.
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Extent of a `rows x cols` grid anchored at the origin.
    pub fn from_shape(rows: usize, cols: usize, cellsize: f64) -> Self {
        Self::new(0.0, cols as f64 * cellsize, 0.0, rows as f64 * cellsize)
    }

    /// Extent of a `rows x cols` grid whose upper-left corner sits at `(x0, y0)`.
    pub fn from_upper_left(x0: f64, y0: f64, rows: usize, cols: usize, cellsize: f64) -> Self {
        Self::new(
            x0,
            x0 + cols as f64 * cellsize,
            y0 - rows as f64 * cellsize,
            y0,
        )
    }

    /// Width of the extent in coordinate units.
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the extent in coordinate units.
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Largest side of the extent.
    pub fn span(&self) -> f64 {
        self.width().max(self.height())
    }

    /// Width over height, falling back to 1 for degenerate extents.
    pub fn aspect_ratio(&self) -> f64 {
        let width = if self.width() > 0.0 { self.width() } else { 1.0 };
        let height = if self.height() > 0.0 { self.height() } else { 1.0 };
        width / height
    }

    /// Smallest extent covering both `self` and `other`.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            xmin: self.xmin.min(other.xmin),
            xmax: self.xmax.max(other.xmax),
            ymin: self.ymin.min(other.ymin),
            ymax: self.ymax.max(other.ymax),
        }
    }

    /// Check if a point lies inside the extent (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// As the `[xmin, xmax, ymin, ymax]` array form.
    pub fn as_array(&self) -> [f64; 4] {
        [self.xmin, self.xmax, self.ymin, self.ymax]
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_shape() {
        let extent = Extent::from_shape(2, 4, 30.0);
        assert_eq!(extent.as_array(), [0.0, 120.0, 0.0, 60.0]);
        assert_eq!(extent.span(), 120.0);
    }

    #[test]
    fn test_from_upper_left() {
        let extent = Extent::from_upper_left(500.0, 1000.0, 10, 5, 2.0);
        assert_eq!(extent.xmin, 500.0);
        assert_eq!(extent.xmax, 510.0);
        assert_eq!(extent.ymin, 980.0);
        assert_eq!(extent.ymax, 1000.0);
    }

    #[test]
    fn test_degenerate_aspect_ratio() {
        let extent = Extent::new(0.0, 0.0, 0.0, 10.0);
        assert_eq!(extent.aspect_ratio(), 0.1);
    }
}
