//! Hillshade layers and the processors that derive them.
//!
//! Shaded layers are new, draped layers drawn in gray over their source.
//! NaN cells of the source are filled with the mean of the grid's finite
//! data before shading, then re-masked in the result.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use topoviz_common::{
    nan_gaussian_smooth, validate_sigma, BoundaryMode, HillshadeOptions, Result, TopovizError,
};
use tracing::debug;

use crate::layer::Layer;
use crate::processor::{Process, Processor, ProcessorKind, Produced};

/// Colormap of derived shade layers.
pub const SHADE_CMAP: &str = "gray";
/// Transparency of derived shade layers.
pub const SHADE_ALPHA: f64 = 0.45;

fn shade_values(
    source: &Layer,
    values: &Array2<f32>,
    opts: &HillshadeOptions,
    alpha: f64,
) -> Result<Layer> {
    let grid = source.grid();
    let has_finite = values.iter().any(|v| v.is_finite());
    let fill = grid.finite_mean().unwrap_or(0.0);

    // An entirely masked value falls back to the grid's own data
    let base = if has_finite { values } else { grid.z() };
    let clean = base.mapv(|v| if v.is_finite() { v } else { fill });
    let shaded_grid = grid.duplicate_with_new_data(clean)?.hillshade(opts);

    let mut shaded = shaded_grid.z().clone();
    Zip::from(&mut shaded).and(base).for_each(|s, &b| {
        if b.is_nan() {
            *s = f32::NAN;
        }
    });

    let mut layer = Layer::builder(shaded_grid)
        .cmap(SHADE_CMAP)
        .alpha(alpha)
        .draped(true)
        .build()?;
    layer.set_value(shaded);
    Ok(layer)
}

/// Mean of two arrays ignoring NaN per cell; NaN only where both are NaN.
pub fn nan_mean2(a: &Array2<f32>, b: &Array2<f32>) -> Array2<f32> {
    Zip::from(a).and(b).map_collect(|&x, &y| match (x.is_finite(), y.is_finite()) {
        (true, true) => (x + y) / 2.0,
        (true, false) => x,
        (false, true) => y,
        (false, false) => f32::NAN,
    })
}

fn two_azimuths(azimuths: &[f64]) -> Result<(f64, f64)> {
    match azimuths {
        [a, b] => Ok((*a, *b)),
        _ => Err(TopovizError::invalid_parameter(
            "azimuths",
            format!("must contain exactly two angles, got {}", azimuths.len()),
        )),
    }
}

fn averaged_layer(source: &Layer, first: Layer, second: Layer, alpha: f64) -> Result<Layer> {
    let averaged = nan_mean2(first.value(), second.value());
    let grid = source.grid().duplicate_with_new_data(averaged.clone())?;
    let mut layer = Layer::builder(grid)
        .cmap(SHADE_CMAP)
        .alpha(alpha)
        .draped(true)
        .build()?;
    layer.set_value(averaged);
    Ok(layer)
}

/// A shade layer of `layer`'s current value.
pub fn hillshade(layer: &Layer, opts: &HillshadeOptions, alpha: f64) -> Result<Layer> {
    shade_values(layer, layer.value(), opts, alpha)
}

/// A shade layer computed on a Gaussian-smoothed copy of the value.
pub fn smooth_hillshade(
    layer: &Layer,
    sigma: f64,
    mode: BoundaryMode,
    opts: &HillshadeOptions,
    alpha: f64,
) -> Result<Layer> {
    let smoothed = nan_gaussian_smooth(layer.value(), validate_sigma(sigma)?, mode);
    shade_values(layer, &smoothed, opts, alpha)
}

/// Average of two shades lit from `azimuths`; `opts.azimuth` is ignored.
pub fn multishade(
    layer: &Layer,
    azimuths: &[f64],
    opts: &HillshadeOptions,
    alpha: f64,
) -> Result<Layer> {
    let (a, b) = two_azimuths(azimuths)?;
    let first = hillshade(layer, &HillshadeOptions { azimuth: a, ..*opts }, alpha)?;
    let second = hillshade(layer, &HillshadeOptions { azimuth: b, ..*opts }, alpha)?;
    averaged_layer(layer, first, second, alpha)
}

/// [`multishade`] on a Gaussian-smoothed copy of the value.
pub fn smooth_multishade(
    layer: &Layer,
    azimuths: &[f64],
    sigma: f64,
    mode: BoundaryMode,
    opts: &HillshadeOptions,
    alpha: f64,
) -> Result<Layer> {
    let (a, b) = two_azimuths(azimuths)?;
    let smoothed = nan_gaussian_smooth(layer.value(), validate_sigma(sigma)?, mode);
    let first = shade_values(layer, &smoothed, &HillshadeOptions { azimuth: a, ..*opts }, alpha)?;
    let second = shade_values(layer, &smoothed, &HillshadeOptions { azimuth: b, ..*opts }, alpha)?;
    averaged_layer(layer, first, second, alpha)
}

/// Derive a hillshade layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Hillshade {
    pub azimuth: f64,
    pub altitude: f64,
    pub exaggerate: f64,
    pub fused: bool,
}

impl Default for Hillshade {
    fn default() -> Self {
        let opts = HillshadeOptions::default();
        Self {
            azimuth: opts.azimuth,
            altitude: opts.altitude,
            exaggerate: opts.exaggerate,
            fused: opts.fused,
        }
    }
}

impl Hillshade {
    pub fn options(&self) -> HillshadeOptions {
        HillshadeOptions {
            azimuth: self.azimuth,
            altitude: self.altitude,
            exaggerate: self.exaggerate,
            fused: self.fused,
        }
    }
}

impl Process for Hillshade {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let shade = hillshade(layer, &self.options(), SHADE_ALPHA)?;
        debug!(layer = %layer.name(), shade = %shade.name(), azimuth = self.azimuth, "hillshade");
        Ok(Produced::Single(shade))
    }
}

/// Derive the average of two hillshades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Multishade {
    pub azimuths: Vec<f64>,
    pub altitude: f64,
    pub exaggerate: f64,
    pub fused: bool,
}

impl Default for Multishade {
    fn default() -> Self {
        Self {
            azimuths: vec![315.0, 135.0],
            altitude: 50.0,
            exaggerate: 1.0,
            fused: true,
        }
    }
}

impl Process for Multishade {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let opts = HillshadeOptions {
            altitude: self.altitude,
            exaggerate: self.exaggerate,
            fused: self.fused,
            ..HillshadeOptions::default()
        };
        let shade = multishade(layer, &self.azimuths, &opts, SHADE_ALPHA)?;
        debug!(layer = %layer.name(), shade = %shade.name(), azimuths = ?self.azimuths, "multishade");
        Ok(Produced::Single(shade))
    }
}

/// Processor deriving a hillshade layer.
pub fn hillshade_processor(azimuth: f64, altitude: f64, exaggerate: f64, fused: bool) -> Processor {
    Processor::new(
        "hillshade",
        ProcessorKind::Hillshade(Hillshade {
            azimuth,
            altitude,
            exaggerate,
            fused,
        }),
    )
    .with_recursive(false)
}

/// Processor deriving a two-azimuth averaged hillshade.
pub fn multishade_processor(
    azimuths: Vec<f64>,
    altitude: f64,
    exaggerate: f64,
    fused: bool,
) -> Processor {
    Processor::new(
        "multishade",
        ProcessorKind::Multishade(Multishade {
            azimuths,
            altitude,
            exaggerate,
            fused,
        }),
    )
    .with_recursive(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use test_utils::{all_nan_dem, cone_dem, count_nan, dem_with_nan_hole};
    use topoviz_common::RasterGrid;

    fn cone_layer() -> Layer {
        Layer::from_grid(RasterGrid::new(cone_dem(16, 16, 50.0), 10.0))
    }

    #[test]
    fn test_hillshade_layer_is_draped_gray() {
        let shade = hillshade(&cone_layer(), &HillshadeOptions::default(), SHADE_ALPHA).unwrap();
        assert!(shade.draped());
        assert_eq!(shade.cmap(), "gray");
        assert_eq!(shade.alpha(), 0.45);
        assert_eq!(shade.value().dim(), (16, 16));
        assert!(shade.value().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_hillshade_keeps_nan_footprint() {
        let layer = Layer::from_grid(RasterGrid::new(dem_with_nan_hole(12, (3, 3, 4)), 1.0));
        let shade = hillshade(&layer, &HillshadeOptions::default(), SHADE_ALPHA).unwrap();
        assert_eq!(count_nan(shade.value()), 16);
        assert!(shade.value()[[4, 4]].is_nan());
        assert!(shade.value()[[0, 0]].is_finite());
    }

    #[test]
    fn test_all_nan_value_falls_back_to_grid() {
        let mut layer = cone_layer();
        layer.set_value(all_nan_dem(16, 16));
        let shade = hillshade(&layer, &HillshadeOptions::default(), SHADE_ALPHA).unwrap();
        assert!(shade.value().iter().any(|v| v.is_finite()));
    }

    #[test]
    fn test_all_nan_grid_is_all_nan() {
        let layer = Layer::from_grid(RasterGrid::new(all_nan_dem(5, 5), 1.0));
        let shade = hillshade(&layer, &HillshadeOptions::default(), SHADE_ALPHA).unwrap();
        assert_eq!(count_nan(shade.value()), 25);
        let multi = multishade(&layer, &[315.0, 135.0], &HillshadeOptions::default(), SHADE_ALPHA)
            .unwrap();
        assert_eq!(count_nan(multi.value()), 25);
    }

    #[test]
    fn test_multishade_is_mean_of_shades() {
        let layer = Layer::from_grid(RasterGrid::new(dem_with_nan_hole(12, (2, 6, 3)), 5.0));
        let opts = HillshadeOptions::default();
        let a = hillshade(&layer, &HillshadeOptions { azimuth: 45.0, ..opts }, SHADE_ALPHA).unwrap();
        let b = hillshade(&layer, &HillshadeOptions { azimuth: 225.0, ..opts }, SHADE_ALPHA).unwrap();
        let m = multishade(&layer, &[45.0, 225.0], &opts, SHADE_ALPHA).unwrap();

        for ((x, y), z) in a.value().iter().zip(b.value().iter()).zip(m.value().iter()) {
            match (x.is_finite(), y.is_finite()) {
                (true, true) => assert!((z - (x + y) / 2.0).abs() < 1e-6),
                (true, false) => assert_eq!(z, x),
                (false, true) => assert_eq!(z, y),
                (false, false) => assert!(z.is_nan()),
            }
        }
    }

    #[test]
    fn test_nan_mean2() {
        let a = array![[1.0f32, f32::NAN, f32::NAN]];
        let b = array![[3.0f32, 5.0, f32::NAN]];
        let m = nan_mean2(&a, &b);
        assert_eq!(m[[0, 0]], 2.0);
        assert_eq!(m[[0, 1]], 5.0);
        assert!(m[[0, 2]].is_nan());
    }

    #[test]
    fn test_multishade_requires_two_azimuths() {
        let err = multishade(&cone_layer(), &[315.0], &HillshadeOptions::default(), SHADE_ALPHA)
            .unwrap_err();
        assert!(matches!(err, TopovizError::InvalidParameter { ref param, .. } if param == "azimuths"));

        let mut layer = cone_layer();
        let err = multishade_processor(vec![1.0, 2.0, 3.0], 50.0, 1.0, true)
            .apply(&mut layer)
            .unwrap_err();
        assert!(matches!(err, TopovizError::InvalidParameter { .. }));
    }

    #[test]
    fn test_smooth_variants_produce_shades() {
        let layer = cone_layer();
        let opts = HillshadeOptions::default();
        let s = smooth_hillshade(&layer, 1.0, BoundaryMode::Nearest, &opts, 0.3).unwrap();
        assert_eq!(s.alpha(), 0.3);
        let m = smooth_multishade(&layer, &[315.0, 135.0], 1.0, BoundaryMode::Nearest, &opts, 0.3)
            .unwrap();
        assert!(m.draped());
        assert!(m.value().iter().all(|v| v.is_finite()));

        let err = smooth_hillshade(&layer, f64::NAN, BoundaryMode::Nearest, &opts, 0.3).unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
    }

    #[test]
    fn test_processor_returns_single_layer() {
        let mut layer = cone_layer();
        let produced = hillshade_processor(315.0, 50.0, 1.0, true).apply(&mut layer).unwrap();
        assert_eq!(produced.len(), 1);
        assert!(!hillshade_processor(315.0, 50.0, 1.0, true).recursive());
    }
}
