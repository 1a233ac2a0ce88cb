//! Analytical hillshading of elevation grids.
//!
//! Gradients use Horn's 3x3 finite-difference operator with edge cells
//! replicated, so the output has the same shape as the input. A cell whose
//! neighbourhood contains a NaN is NaN in the output.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Illumination parameters for a hillshade computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HillshadeOptions {
    /// Light source azimuth in degrees clockwise from north.
    pub azimuth: f64,
    /// Light source altitude in degrees above the horizon.
    pub altitude: f64,
    /// Vertical exaggeration applied to the gradient.
    pub exaggerate: f64,
    /// Compute gradient and illumination in a single pass.
    pub fused: bool,
}

impl Default for HillshadeOptions {
    fn default() -> Self {
        Self {
            azimuth: 315.0,
            altitude: 50.0,
            exaggerate: 1.0,
            fused: true,
        }
    }
}

/// Precomputed sun geometry.
struct Sun {
    cos_zenith: f64,
    sin_zenith: f64,
    azimuth_math: f64,
}

impl Sun {
    fn new(opts: &HillshadeOptions) -> Self {
        let zenith = (90.0 - opts.altitude).to_radians();
        let azimuth_math = (360.0 - opts.azimuth + 90.0).rem_euclid(360.0).to_radians();
        Self {
            cos_zenith: zenith.cos(),
            sin_zenith: zenith.sin(),
            azimuth_math,
        }
    }

    fn illuminate(&self, dzdx: f64, dzdy: f64, exaggerate: f64) -> f32 {
        if !dzdx.is_finite() || !dzdy.is_finite() {
            return f32::NAN;
        }
        let slope = (exaggerate * (dzdx * dzdx + dzdy * dzdy).sqrt()).atan();
        let mut aspect = dzdy.atan2(-dzdx);
        if aspect < 0.0 {
            aspect += 2.0 * std::f64::consts::PI;
        }
        let shade = self.cos_zenith * slope.cos()
            + self.sin_zenith * slope.sin() * (self.azimuth_math - aspect).cos();
        shade.clamp(0.0, 1.0) as f32
    }
}

/// Horn gradient at `(r, c)` with edge replication. NaN propagates.
fn horn_gradient(z: &Array2<f32>, r: usize, c: usize, cellsize: f64) -> (f64, f64) {
    let (rows, cols) = z.dim();
    let up = r.saturating_sub(1);
    let down = (r + 1).min(rows - 1);
    let left = c.saturating_sub(1);
    let right = (c + 1).min(cols - 1);
    let at = |rr: usize, cc: usize| z[[rr, cc]] as f64;

    let (a, b, cc) = (at(up, left), at(up, c), at(up, right));
    let (d, f) = (at(r, left), at(r, right));
    let (g, h, i) = (at(down, left), at(down, c), at(down, right));

    let dzdx = ((cc + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * cellsize);
    let dzdy = ((g + 2.0 * h + i) - (a + 2.0 * b + cc)) / (8.0 * cellsize);
    (dzdx, dzdy)
}

/// Compute a hillshade intensity grid in `[0, 1]`.
pub fn hillshade(z: &Array2<f32>, cellsize: f64, opts: &HillshadeOptions) -> Array2<f32> {
    if z.is_empty() {
        return z.clone();
    }
    let cellsize = if cellsize > 0.0 { cellsize } else { 1.0 };
    let sun = Sun::new(opts);
    let (rows, cols) = z.dim();

    if opts.fused {
        return Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (dzdx, dzdy) = horn_gradient(z, r, c, cellsize);
            sun.illuminate(dzdx, dzdy, opts.exaggerate)
        });
    }

    // Two-pass variant: materialise the gradient field first.
    let mut dzdx = Array2::<f64>::zeros((rows, cols));
    let mut dzdy = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let (gx, gy) = horn_gradient(z, r, c, cellsize);
            dzdx[[r, c]] = gx;
            dzdy[[r, c]] = gy;
        }
    }
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        sun.illuminate(dzdx[[r, c]], dzdy[[r, c]], opts.exaggerate)
    })
}
