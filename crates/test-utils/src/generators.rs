//! Test data generators for creating synthetic elevation models.
//!
//! These generators create predictable, verifiable surfaces that can be used
//! across the test suite. All arrays are `(rows, cols)`, row 0 at the top.

use ndarray::Array2;

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.dim(), (5, 10));
/// assert_eq!(grid[[0, 1]], 1000.0); // col=1, row=0
/// assert_eq!(grid[[1, 0]], 1.0);    // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(row, col)| (col * 1000 + row) as f32)
}

/// A plane rising `slope` units per column towards the east.
pub fn ramp_dem(width: usize, height: usize, slope: f32) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(_, col)| col as f32 * slope)
}

/// A cone peaking at the grid centre with the given height.
///
/// Values fall off linearly with distance and are clamped at zero.
pub fn cone_dem(width: usize, height: usize, peak: f32) -> Array2<f32> {
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);
    Array2::from_shape_fn((height, width), |(row, col)| {
        let dx = col as f32 - cx;
        let dy = row as f32 - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        (peak * (1.0 - dist / max_dist)).max(0.0)
    })
}

/// A cone DEM with a square block of NaN cells (a nodata hole).
///
/// # Arguments
///
/// * `size` - Width and height of the grid
/// * `hole` - `(row, col, extent)` of the top-left corner and side of the hole
pub fn dem_with_nan_hole(size: usize, hole: (usize, usize, usize)) -> Array2<f32> {
    let (r0, c0, side) = hole;
    let mut dem = cone_dem(size, size, 100.0);
    for row in r0..(r0 + side).min(size) {
        for col in c0..(c0 + side).min(size) {
            dem[[row, col]] = f32::NAN;
        }
    }
    dem
}

/// A grid filled entirely with NaN.
pub fn all_nan_dem(width: usize, height: usize) -> Array2<f32> {
    Array2::from_elem((height, width), f32::NAN)
}

/// Count the NaN cells of an array.
pub fn count_nan(values: &Array2<f32>) -> usize {
    values.iter().filter(|v| v.is_nan()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid.dim(), (2, 3));
        assert_eq!(grid[[1, 2]], 2001.0);
    }

    #[test]
    fn test_cone_peak_at_centre() {
        let dem = cone_dem(5, 5, 50.0);
        assert_eq!(dem[[2, 2]], 50.0);
        assert!(dem[[0, 0]] < dem[[1, 1]]);
    }

    #[test]
    fn test_hole_is_nan() {
        let dem = dem_with_nan_hole(10, (2, 3, 4));
        assert_eq!(count_nan(&dem), 16);
        assert!(dem[[2, 3]].is_nan());
        assert!(dem[[5, 6]].is_nan());
        assert!(!dem[[6, 6]].is_nan());
    }
}
