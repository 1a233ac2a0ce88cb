//! 3D-only processors: height scaling and lighting.
//!
//! None of these run when expanding for 2D.

use serde::{Deserialize, Serialize};
use topoviz_common::Result;
use tracing::debug;

use crate::layer::{Layer, Lighting};
use crate::processor::{Process, Processor, ProcessorKind, Produced};

/// Multiply the layer's 3D height multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scale {
    pub factor: f64,
}

impl Default for Scale {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl Process for Scale {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let next = layer.z_scale_factor() * self.factor;
        debug!(layer = %layer.name(), factor = self.factor, z_scale_factor = next, "scale");
        layer.set_z_scale_factor(next);
        Ok(Produced::Empty)
    }
}

/// Processor scaling 3D surface height by `factor`.
pub fn scale(factor: f64) -> Processor {
    Processor::new("scale", ProcessorKind::Scale(Scale { factor })).only_3d()
}

pub fn double_scale() -> Processor {
    scale(2.0)
}

pub fn halve_scale() -> Processor {
    scale(0.5)
}

pub fn tenfold() -> Processor {
    scale(10.0)
}

pub fn tenthfold() -> Processor {
    scale(0.1)
}

/// Set (or clear) absolute lighting parameters on a layer.
///
/// Fields left `None` are not touched. With `reset` the layer's lighting
/// returns to defaults before the set fields apply. With `enabled = false`
/// the flat preset replaces everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightingControl {
    pub enabled: bool,
    pub reset: bool,
    pub ambient: Option<f64>,
    pub diffuse: Option<f64>,
    pub specular: Option<f64>,
    pub specular_power: Option<f64>,
    pub smooth_shading: Option<bool>,
    pub eye_dome_lighting: Option<bool>,
    pub light_azimuth: Option<f64>,
    pub light_elevation: Option<f64>,
    pub light_intensity: Option<f64>,
}

impl Default for LightingControl {
    fn default() -> Self {
        Self {
            enabled: true,
            reset: false,
            ambient: None,
            diffuse: None,
            specular: None,
            specular_power: None,
            smooth_shading: None,
            eye_dome_lighting: None,
            light_azimuth: None,
            light_elevation: None,
            light_intensity: None,
        }
    }
}

impl LightingControl {
    /// Fully lit by ambient light only: no relief shading at all.
    pub fn flat() -> Self {
        Self {
            reset: true,
            ambient: Some(1.0),
            diffuse: Some(0.0),
            specular: Some(0.0),
            specular_power: Some(1.0),
            smooth_shading: Some(false),
            eye_dome_lighting: Some(false),
            ..Self::default()
        }
    }

    pub fn matte() -> Self {
        Self {
            ambient: Some(0.3),
            diffuse: Some(0.7),
            specular: Some(0.0),
            specular_power: Some(1.0),
            ..Self::default()
        }
    }

    pub fn glossy() -> Self {
        Self {
            ambient: Some(0.15),
            diffuse: Some(0.7),
            specular: Some(0.6),
            specular_power: Some(40.0),
            smooth_shading: Some(true),
            ..Self::default()
        }
    }

    pub fn dramatic() -> Self {
        Self {
            ambient: Some(0.05),
            diffuse: Some(0.9),
            specular: Some(0.3),
            specular_power: Some(20.0),
            light_elevation: Some(20.0),
            light_intensity: Some(1.4),
            ..Self::default()
        }
    }

    /// Even light that reads as a height map, with depth cues from eye dome lighting.
    pub fn heightmap() -> Self {
        Self {
            ambient: Some(0.6),
            diffuse: Some(0.4),
            specular: Some(0.0),
            eye_dome_lighting: Some(true),
            ..Self::default()
        }
    }

    fn apply_to(&self, lighting: &mut Lighting) {
        if !self.enabled {
            Self::flat().apply_to(lighting);
            return;
        }
        if self.reset {
            *lighting = Lighting::default();
        }
        if let Some(v) = self.ambient {
            lighting.set_ambient(v);
        }
        if let Some(v) = self.diffuse {
            lighting.set_diffuse(v);
        }
        if let Some(v) = self.specular {
            lighting.set_specular(v);
        }
        if let Some(v) = self.specular_power {
            lighting.set_specular_power(v);
        }
        if self.smooth_shading.is_some() {
            lighting.smooth_shading = self.smooth_shading;
        }
        if self.eye_dome_lighting.is_some() {
            lighting.eye_dome_lighting = self.eye_dome_lighting;
        }
        if self.light_azimuth.is_some() {
            lighting.light_azimuth = self.light_azimuth;
        }
        if self.light_elevation.is_some() {
            lighting.light_elevation = self.light_elevation;
        }
        if self.light_intensity.is_some() {
            lighting.light_intensity = self.light_intensity;
        }
    }
}

impl Process for LightingControl {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        self.apply_to(layer.lighting_mut());
        debug!(layer = %layer.name(), enabled = self.enabled, lighting = ?layer.lighting(), "lighting_control");
        Ok(Produced::Empty)
    }
}

/// Nudge lighting relative to the layer's current values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightingAdjust {
    pub ambient_delta: f64,
    pub diffuse_delta: f64,
    pub specular_delta: f64,
    pub intensity_scale: f64,
    /// Degrees added to the light azimuth (clockwise).
    pub azimuth_delta: f64,
    /// Degrees added to the light elevation, kept within [0, 90].
    pub elevation_delta: f64,
}

impl Default for LightingAdjust {
    fn default() -> Self {
        Self {
            ambient_delta: 0.0,
            diffuse_delta: 0.0,
            specular_delta: 0.0,
            intensity_scale: 1.0,
            azimuth_delta: 0.0,
            elevation_delta: 0.0,
        }
    }
}

impl Process for LightingAdjust {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let lighting = layer.lighting_mut();
        lighting.set_ambient(lighting.ambient + self.ambient_delta);
        lighting.set_diffuse(lighting.diffuse + self.diffuse_delta);
        lighting.set_specular(lighting.specular + self.specular_delta);
        if self.intensity_scale != 1.0 {
            lighting.light_intensity =
                Some((lighting.intensity_or_default() * self.intensity_scale).max(0.0));
        }
        if self.azimuth_delta != 0.0 {
            lighting.light_azimuth =
                Some((lighting.azimuth_or_default() + self.azimuth_delta).rem_euclid(360.0));
        }
        if self.elevation_delta != 0.0 {
            lighting.light_elevation =
                Some((lighting.elevation_or_default() + self.elevation_delta).clamp(0.0, 90.0));
        }
        debug!(layer = %layer.name(), lighting = ?layer.lighting(), "lighting_adjust");
        Ok(Produced::Empty)
    }
}

/// Processor setting absolute lighting parameters.
pub fn lighting_control(control: LightingControl) -> Processor {
    Processor::new("lighting_control", ProcessorKind::LightingControl(control)).only_3d()
}

/// Processor nudging lighting parameters.
pub fn lighting_adjust(adjust: LightingAdjust) -> Processor {
    Processor::new("lighting_adjust", ProcessorKind::LightingAdjust(adjust)).only_3d()
}

pub fn matte_lighting() -> Processor {
    lighting_control(LightingControl::matte())
}

pub fn glossy_lighting() -> Processor {
    lighting_control(LightingControl::glossy())
}

pub fn flat_lighting() -> Processor {
    lighting_control(LightingControl {
        enabled: false,
        ..LightingControl::default()
    })
}

pub fn dramatic_lighting() -> Processor {
    lighting_control(LightingControl::dramatic())
}

pub fn heightmap_lighting() -> Processor {
    lighting_control(LightingControl::heightmap())
}

pub fn lighting_intensity_up() -> Processor {
    lighting_adjust(LightingAdjust {
        intensity_scale: 1.25,
        ..LightingAdjust::default()
    })
}

pub fn lighting_intensity_down() -> Processor {
    lighting_adjust(LightingAdjust {
        intensity_scale: 0.8,
        ..LightingAdjust::default()
    })
}

pub fn lighting_brighten() -> Processor {
    lighting_adjust(LightingAdjust {
        ambient_delta: 0.1,
        diffuse_delta: 0.1,
        ..LightingAdjust::default()
    })
}

pub fn lighting_darken() -> Processor {
    lighting_adjust(LightingAdjust {
        ambient_delta: -0.1,
        diffuse_delta: -0.1,
        ..LightingAdjust::default()
    })
}

pub fn light_rotate_left() -> Processor {
    lighting_adjust(LightingAdjust {
        azimuth_delta: -45.0,
        ..LightingAdjust::default()
    })
}

pub fn light_rotate_right() -> Processor {
    lighting_adjust(LightingAdjust {
        azimuth_delta: 45.0,
        ..LightingAdjust::default()
    })
}

pub fn light_raise() -> Processor {
    lighting_adjust(LightingAdjust {
        elevation_delta: 15.0,
        ..LightingAdjust::default()
    })
}

pub fn light_lower() -> Processor {
    lighting_adjust(LightingAdjust {
        elevation_delta: -15.0,
        ..LightingAdjust::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::RenderMode;
    use ndarray::array;
    use topoviz_common::RasterGrid;

    fn layer() -> Layer {
        Layer::from_grid(RasterGrid::new(array![[1.0f32, 2.0]], 1.0))
    }

    #[test]
    fn test_scale_composes() {
        let mut l = layer();
        scale(2.0).apply(&mut l).unwrap();
        scale(2.0).apply(&mut l).unwrap();
        assert_eq!(l.z_scale_factor(), 4.0);
        tenthfold().apply(&mut l).unwrap();
        assert!((l.z_scale_factor() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_helpers_are_3d_only() {
        for p in [double_scale(), matte_lighting(), light_raise(), flat_lighting()] {
            assert!(!p.compatible_with(RenderMode::TwoD));
            assert!(p.compatible_with(RenderMode::ThreeD));
        }
    }

    #[test]
    fn test_disabled_lighting_forces_flat() {
        let mut l = layer();
        let control = LightingControl {
            enabled: false,
            specular: Some(0.9),
            light_intensity: Some(3.0),
            ..LightingControl::default()
        };
        lighting_control(control).apply(&mut l).unwrap();
        let lighting = l.lighting();
        assert_eq!(lighting.ambient, 1.0);
        assert_eq!(lighting.diffuse, 0.0);
        assert_eq!(lighting.specular, 0.0);
        assert_eq!(lighting.smooth_shading, Some(false));
        assert_eq!(lighting.light_intensity, None);
    }

    #[test]
    fn test_control_only_sets_given_fields() {
        let mut l = layer();
        l.lighting_mut().light_azimuth = Some(90.0);
        glossy_lighting().apply(&mut l).unwrap();
        assert_eq!(l.lighting().specular, 0.6);
        assert_eq!(l.lighting().light_azimuth, Some(90.0));
    }

    #[test]
    fn test_adjusters() {
        let mut l = layer();
        light_rotate_left().apply(&mut l).unwrap();
        assert_eq!(l.lighting().light_azimuth, Some(270.0));
        for _ in 0..8 {
            light_raise().apply(&mut l).unwrap();
        }
        assert_eq!(l.lighting().light_elevation, Some(90.0));
        lighting_intensity_up().apply(&mut l).unwrap();
        assert_eq!(l.lighting().light_intensity, Some(1.25));
        for _ in 0..20 {
            lighting_darken().apply(&mut l).unwrap();
        }
        assert_eq!(l.lighting().ambient, 0.0);
    }

    #[test]
    fn test_lighting_params_serialize() {
        let params = matte_lighting().params();
        assert_eq!(params["ambient"], serde_json::json!(0.3));
        assert_eq!(params["enabled"], serde_json::json!(true));
        assert!(params["light_azimuth"].is_null());
    }
}
