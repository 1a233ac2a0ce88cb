//! NaN-aware Gaussian smoothing of raster values.
//!
//! The filter mirrors the behaviour of a separable Gaussian convolution with a
//! kernel truncated at four standard deviations. Missing cells are handled by
//! smoothing the data and the valid-data mask separately and renormalising:
//!
//! ```text
//! filled   = where(valid, data, 0)
//! smoothed = G * filled
//! weights  = G * valid
//! result   = smoothed / weights      (NaN where weights == 0)
//! ```
//!
//! A cell whose kernel support holds no valid value therefore comes out NaN
//! instead of picking up the fill value.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopovizError};

/// Kernel radius in standard deviations.
const TRUNCATE: f64 = 4.0;

/// How the convolution extends the input beyond its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// `d c b a | a b c d | d c b a`
    Reflect,
    /// `a a a a | a b c d | d d d d`
    #[default]
    Nearest,
    /// `d c b | a b c d | c b a`
    Mirror,
    /// `0 0 0 0 | a b c d | 0 0 0 0`
    Constant,
    /// `a b c d | a b c d | a b c d`
    Wrap,
}

impl BoundaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflect => "reflect",
            Self::Nearest => "nearest",
            Self::Mirror => "mirror",
            Self::Constant => "constant",
            Self::Wrap => "wrap",
        }
    }

    /// Map a possibly out-of-range index onto `0..len`, or `None` when the
    /// sample lies in constant padding.
    fn resolve(&self, idx: isize, len: usize) -> Option<usize> {
        let n = len as isize;
        if (0..n).contains(&idx) {
            return Some(idx as usize);
        }
        match self {
            Self::Constant => None,
            Self::Nearest => Some(idx.clamp(0, n - 1) as usize),
            Self::Wrap => Some(idx.rem_euclid(n) as usize),
            Self::Reflect => {
                let period = 2 * n;
                let i = idx.rem_euclid(period);
                let folded = if i >= n { period - 1 - i } else { i };
                Some(folded as usize)
            }
            Self::Mirror => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * n - 2;
                let i = idx.rem_euclid(period);
                let folded = if i >= n { period - i } else { i };
                Some(folded as usize)
            }
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryMode {
    type Err = TopovizError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reflect" => Ok(Self::Reflect),
            "nearest" => Ok(Self::Nearest),
            "mirror" => Ok(Self::Mirror),
            "constant" => Ok(Self::Constant),
            "wrap" => Ok(Self::Wrap),
            other => Err(TopovizError::invalid_parameter(
                "mode",
                format!("unsupported boundary mode '{}'", other),
            )),
        }
    }
}

/// Check a smoothing sigma before it reaches the kernel builder.
pub fn validate_sigma(sigma: f64) -> Result<f64> {
    if sigma.is_finite() && sigma >= 0.0 {
        Ok(sigma)
    } else {
        Err(TopovizError::invalid_parameter(
            "sigma",
            format!("must be a finite, non-negative number, got {}", sigma),
        ))
    }
}

/// Normalised 1D Gaussian kernel, truncated at four sigma.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-((x * x) as f64) / denom).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Convolve every lane of `data` along `axis` with `kernel`.
fn correlate_axis(data: &Array2<f64>, kernel: &[f64], axis: Axis, mode: BoundaryMode) -> Array2<f64> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array2::<f64>::zeros(data.raw_dim());
    for (src, mut dst) in data.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let len = src.len();
        for i in 0..len {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let idx = i as isize + k as isize - radius;
                if let Some(j) = mode.resolve(idx, len) {
                    acc += w * src[j];
                }
            }
            dst[i] = acc;
        }
    }
    out
}

/// Separable 2D Gaussian filter. A non-positive sigma returns the input unchanged.
pub fn gaussian_filter(data: &Array2<f64>, sigma: f64, mode: BoundaryMode) -> Array2<f64> {
    if sigma <= 0.0 || data.is_empty() {
        return data.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let rows_done = correlate_axis(data, &kernel, Axis(0), mode);
    correlate_axis(&rows_done, &kernel, Axis(1), mode)
}

/// Gaussian smoothing that ignores NaN cells and keeps unsupported cells NaN.
///
/// All-NaN input yields all-NaN output without any division by zero.
pub fn nan_gaussian_smooth(values: &Array2<f32>, sigma: f64, mode: BoundaryMode) -> Array2<f32> {
    let valid = values.mapv(|v| if v.is_finite() { 1.0 } else { 0.0 });
    let filled = values.mapv(|v| if v.is_finite() { v as f64 } else { 0.0 });

    let smoothed = gaussian_filter(&filled, sigma, mode);
    let weights = gaussian_filter(&valid, sigma, mode);

    let mut result = Array2::<f32>::from_elem(values.raw_dim(), f32::NAN);
    ndarray::Zip::from(&mut result)
        .and(&smoothed)
        .and(&weights)
        .for_each(|r, &s, &w| {
            if w > 0.0 {
                *r = (s / w) as f32;
            }
        });
    result
}
