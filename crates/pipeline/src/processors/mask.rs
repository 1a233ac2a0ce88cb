//! Masking processors: turn selected cells of a layer's value into NaN.

use ndarray::Array2;
use serde::{Deserialize, Deserializer, Serialize};
use topoviz_common::{Result, TopovizError};
use tracing::{debug, warn};

use crate::layer::Layer;
use crate::processor::{Process, Processor, ProcessorKind, Produced};

/// Mask cells exactly equal to `target`. `target` has no default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NanEqual {
    pub target: f64,
}

impl Process for NanEqual {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let target = self.target as f32;
        let masked = layer.mask_where(|v| v == target);
        debug!(layer = %layer.name(), target = self.target, masked, "nan_equal");
        Ok(Produced::Empty)
    }
}

/// Mask cells at or below `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NanBelow {
    pub threshold: f64,
}

impl Default for NanBelow {
    fn default() -> Self {
        Self { threshold: 0.0 }
    }
}

impl Process for NanBelow {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let threshold = self.threshold as f32;
        let masked = layer.mask_where(|v| v <= threshold);
        debug!(layer = %layer.name(), threshold = self.threshold, masked, "nan_below");
        Ok(Produced::Empty)
    }
}

/// Mask cells at or above `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NanAbove {
    pub threshold: f64,
}

impl Default for NanAbove {
    fn default() -> Self {
        Self { threshold: 0.0 }
    }
}

impl Process for NanAbove {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let threshold = self.threshold as f32;
        let masked = layer.mask_where(|v| v >= threshold);
        debug!(layer = %layer.name(), threshold = self.threshold, masked, "nan_above");
        Ok(Produced::Empty)
    }
}

/// Mask cells where a boolean array is true.
///
/// The mask is never written to workflow documents. It can be read back
/// from an explicit nested boolean array under the `mask` key; without one
/// the processor does nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NanMask {
    #[serde(skip_serializing, deserialize_with = "mask_from_rows")]
    pub mask: Array2<bool>,
}

fn mask_from_rows<'de, D>(deserializer: D) -> std::result::Result<Array2<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<bool>> = Vec::deserialize(deserializer)?;
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    let flat: Vec<bool> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat).map_err(serde::de::Error::custom)
}

impl Process for NanMask {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        if self.mask.is_empty() {
            warn!(layer = %layer.name(), "nan_mask has no mask; layer left unchanged");
            return Ok(Produced::Empty);
        }
        let expected = layer.value().dim();
        if self.mask.dim() != expected {
            return Err(TopovizError::ShapeMismatch {
                expected,
                actual: self.mask.dim(),
            });
        }
        let mut value = layer.value().clone();
        let mut masked = 0usize;
        ndarray::Zip::from(&mut value).and(&self.mask).for_each(|v, &m| {
            if m {
                *v = f32::NAN;
                masked += 1;
            }
        });
        // Keep the display bounds the caller had.
        let (vmin, vmax) = (layer.vmin(), layer.vmax());
        layer.set_value(value);
        layer.set_vmin(vmin);
        layer.set_vmax(vmax);
        debug!(layer = %layer.name(), masked, "nan_mask");
        Ok(Produced::Empty)
    }
}

/// Processor masking values equal to `target`.
pub fn nan_equal(target: f64) -> Processor {
    Processor::new("nan_equal", ProcessorKind::NanEqual(NanEqual { target }))
}

/// Processor masking values `<= threshold`.
pub fn nan_below(threshold: f64) -> Processor {
    Processor::new("nan_below", ProcessorKind::NanBelow(NanBelow { threshold }))
}

/// Processor masking values `>= threshold`.
pub fn nan_above(threshold: f64) -> Processor {
    Processor::new("nan_above", ProcessorKind::NanAbove(NanAbove { threshold }))
}

/// Processor masking cells where `mask` is true.
pub fn nan_mask(mask: Array2<bool>) -> Processor {
    Processor::new("nan_mask", ProcessorKind::NanMask(NanMask { mask }))
}
