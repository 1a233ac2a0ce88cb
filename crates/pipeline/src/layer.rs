//! The map layer: a raster grid plus its display and processing configuration.

use std::hash::{Hash, Hasher};

use ndarray::Array2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use topoviz_common::{RasterGrid, Result, TopovizError};

use crate::processor::Processor;

/// Length of auto-generated layer names.
pub const GENERATED_NAME_LEN: usize = 8;

/// Colormap applied when none is given.
pub const DEFAULT_CMAP: &str = "terrain";

/// 3D lighting and shading parameters of a layer.
///
/// The four material coefficients always have a value. The remaining
/// fields are overrides: `None` means "inherit the renderer default".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lighting {
    pub ambient: f64,
    pub diffuse: f64,
    pub specular: f64,
    pub specular_power: f64,
    pub smooth_shading: Option<bool>,
    pub eye_dome_lighting: Option<bool>,
    pub light_azimuth: Option<f64>,
    pub light_elevation: Option<f64>,
    pub light_intensity: Option<f64>,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: 0.15,
            diffuse: 0.8,
            specular: 0.1,
            specular_power: 10.0,
            smooth_shading: None,
            eye_dome_lighting: None,
            light_azimuth: None,
            light_elevation: None,
            light_intensity: None,
        }
    }
}

impl Lighting {
    /// Scene light azimuth used when no override is set (degrees).
    pub const DEFAULT_AZIMUTH: f64 = 315.0;
    /// Scene light elevation used when no override is set (degrees).
    pub const DEFAULT_ELEVATION: f64 = 45.0;
    /// Scene light intensity used when no override is set.
    pub const DEFAULT_INTENSITY: f64 = 1.0;

    pub fn set_ambient(&mut self, value: f64) {
        self.ambient = value.clamp(0.0, 1.0);
    }

    pub fn set_diffuse(&mut self, value: f64) {
        self.diffuse = value.clamp(0.0, 1.0);
    }

    pub fn set_specular(&mut self, value: f64) {
        self.specular = value.clamp(0.0, 1.0);
    }

    pub fn set_specular_power(&mut self, value: f64) {
        self.specular_power = value.max(0.0);
    }

    /// Apply the clamping rules to every coefficient.
    pub fn clamped(mut self) -> Self {
        self.set_ambient(self.ambient);
        self.set_diffuse(self.diffuse);
        self.set_specular(self.specular);
        self.set_specular_power(self.specular_power);
        self
    }

    /// Effective light azimuth, falling back to the default.
    pub fn azimuth_or_default(&self) -> f64 {
        self.light_azimuth.unwrap_or(Self::DEFAULT_AZIMUTH)
    }

    pub fn elevation_or_default(&self) -> f64 {
        self.light_elevation.unwrap_or(Self::DEFAULT_ELEVATION)
    }

    pub fn intensity_or_default(&self) -> f64 {
        self.light_intensity.unwrap_or(Self::DEFAULT_INTENSITY)
    }
}

/// A raster grid wrapped with display and processing configuration.
///
/// Two layers are equal (and hash identically) when their names match,
/// regardless of the data they hold.
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    grid: RasterGrid,
    value: Array2<f32>,
    vmin: f64,
    vmax: f64,
    cmap: String,
    alpha: f64,
    cbar: Option<String>,
    processors: Vec<Processor>,
    draped: bool,
    z_scale_factor: f64,
    lighting: Lighting,
}

impl Layer {
    /// Wrap a grid with all display defaults and a generated name.
    pub fn from_grid(grid: RasterGrid) -> Self {
        let value = normalize(grid.z());
        let (vmin, vmax) = nan_min_max(&value);
        Self {
            name: generate_name(),
            grid,
            value,
            vmin,
            vmax,
            cmap: DEFAULT_CMAP.to_string(),
            alpha: 1.0,
            cbar: None,
            processors: Vec::new(),
            draped: false,
            z_scale_factor: 1.0,
            lighting: Lighting::default(),
        }
    }

    /// Start building a layer over `grid`.
    pub fn builder(grid: RasterGrid) -> LayerBuilder {
        LayerBuilder::new(grid)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    /// Replace the grid; the value is reset from the new grid's data.
    pub fn set_grid(&mut self, grid: RasterGrid) {
        let value = grid.z().clone();
        self.grid = grid;
        self.set_value(value);
    }

    /// Current display values (finite or NaN).
    pub fn value(&self) -> &Array2<f32> {
        &self.value
    }

    /// Replace the values, normalizing non-finite cells to NaN and
    /// recomputing `vmin`/`vmax` from the new data.
    pub fn set_value(&mut self, value: Array2<f32>) {
        let mut value = value;
        value.mapv_inplace(|v| if v.is_finite() { v } else { f32::NAN });
        let (vmin, vmax) = nan_min_max(&value);
        self.value = value;
        self.vmin = vmin;
        self.vmax = vmax;
    }

    /// Set every cell matching `pred` to NaN in place.
    ///
    /// Display bounds are left untouched.
    pub fn mask_where<F>(&mut self, pred: F) -> usize
    where
        F: Fn(f32) -> bool,
    {
        let mut masked = 0;
        for v in self.value.iter_mut() {
            if !v.is_nan() && pred(*v) {
                *v = f32::NAN;
                masked += 1;
            }
        }
        masked
    }

    pub fn vmin(&self) -> f64 {
        self.vmin
    }

    pub fn set_vmin(&mut self, vmin: f64) {
        self.vmin = vmin;
    }

    pub fn vmax(&self) -> f64 {
        self.vmax
    }

    pub fn set_vmax(&mut self, vmax: f64) {
        self.vmax = vmax;
    }

    pub fn cmap(&self) -> &str {
        &self.cmap
    }

    pub fn set_cmap(&mut self, cmap: impl Into<String>) {
        self.cmap = cmap.into();
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    /// Colorbar label, if a colorbar is requested.
    pub fn cbar(&self) -> Option<&str> {
        self.cbar.as_deref()
    }

    pub fn set_cbar(&mut self, label: Option<String>) {
        self.cbar = label;
    }

    /// Attached processors in application order.
    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn processors_mut(&mut self) -> &mut Vec<Processor> {
        &mut self.processors
    }

    pub fn add_processor(&mut self, processor: Processor) {
        self.processors.push(processor);
    }

    pub fn draped(&self) -> bool {
        self.draped
    }

    pub fn set_draped(&mut self, draped: bool) {
        self.draped = draped;
    }

    /// 3D height multiplier, ignored in 2D.
    pub fn z_scale_factor(&self) -> f64 {
        self.z_scale_factor
    }

    pub fn set_z_scale_factor(&mut self, factor: f64) {
        self.z_scale_factor = factor;
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    /// Mutable lighting parameters. Use the `Lighting` setters to keep
    /// coefficients clamped.
    pub fn lighting_mut(&mut self) -> &mut Lighting {
        &mut self.lighting
    }

    pub fn set_lighting(&mut self, lighting: Lighting) {
        self.lighting = lighting.clamped();
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Layer {}

impl Hash for Layer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Builder for [`Layer`] with explicit display parameters.
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    grid: RasterGrid,
    name: Option<String>,
    cmap: Option<String>,
    vmin: Option<f64>,
    vmax: Option<f64>,
    alpha: f64,
    cbar: Option<String>,
    processors: Vec<Processor>,
    draped: bool,
    lighting: Lighting,
}

impl LayerBuilder {
    fn new(grid: RasterGrid) -> Self {
        Self {
            grid,
            name: None,
            cmap: None,
            vmin: None,
            vmax: None,
            alpha: 1.0,
            cbar: None,
            processors: Vec::new(),
            draped: false,
            lighting: Lighting::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cmap(mut self, cmap: impl Into<String>) -> Self {
        self.cmap = Some(cmap.into());
        self
    }

    pub fn vmin(mut self, vmin: f64) -> Self {
        self.vmin = Some(vmin);
        self
    }

    pub fn vmax(mut self, vmax: f64) -> Self {
        self.vmax = Some(vmax);
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn cbar(mut self, label: impl Into<String>) -> Self {
        self.cbar = Some(label.into());
        self
    }

    pub fn processor(mut self, processor: Processor) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn processors(mut self, processors: impl IntoIterator<Item = Processor>) -> Self {
        self.processors.extend(processors);
        self
    }

    pub fn draped(mut self, draped: bool) -> Self {
        self.draped = draped;
        self
    }

    pub fn lighting(mut self, lighting: Lighting) -> Self {
        self.lighting = lighting;
        self
    }

    /// Build the layer, failing if an explicit name is empty.
    pub fn build(self) -> Result<Layer> {
        let name = match self.name {
            Some(name) if name.is_empty() => {
                return Err(TopovizError::InvalidName(
                    "layer name must be a non-empty string".to_string(),
                ))
            }
            Some(name) => name,
            None => generate_name(),
        };

        let mut layer = Layer::from_grid(self.grid);
        layer.name = name;
        if let Some(cmap) = self.cmap {
            layer.cmap = cmap;
        }
        if let Some(vmin) = self.vmin {
            layer.vmin = vmin;
        }
        if let Some(vmax) = self.vmax {
            layer.vmax = vmax;
        }
        layer.alpha = self.alpha;
        layer.cbar = self.cbar;
        layer.processors = self.processors;
        layer.draped = self.draped;
        layer.lighting = self.lighting.clamped();
        Ok(layer)
    }
}

/// Random alphanumeric identifier.
pub fn generate_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_NAME_LEN)
        .map(char::from)
        .collect()
}

fn normalize(values: &Array2<f32>) -> Array2<f32> {
    values.mapv(|v| if v.is_finite() { v } else { f32::NAN })
}

/// NaN-aware `(min, max)`; `(NaN, NaN)` when nothing is finite.
pub fn nan_min_max(values: &Array2<f32>) -> (f64, f64) {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .map(|(lo, hi)| (lo as f64, hi as f64))
        .unwrap_or((f64::NAN, f64::NAN))
}
