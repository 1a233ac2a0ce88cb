//! Smoothing processors.

use serde::{Deserialize, Serialize};
use topoviz_common::{nan_gaussian_smooth, validate_sigma, BoundaryMode, Result};
use tracing::debug;

use crate::layer::Layer;
use crate::processor::{Process, Processor, ProcessorKind, Produced};

/// NaN-aware Gaussian blur of the layer's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaussianSmooth {
    /// Standard deviation in cells.
    pub sigma: f64,
    pub mode: BoundaryMode,
}

impl Default for GaussianSmooth {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            mode: BoundaryMode::Nearest,
        }
    }
}

impl Process for GaussianSmooth {
    fn process(&self, layer: &mut Layer) -> Result<Produced> {
        let sigma = validate_sigma(self.sigma)?;
        let smoothed = nan_gaussian_smooth(layer.value(), sigma, self.mode);
        debug!(layer = %layer.name(), sigma = self.sigma, mode = %self.mode, "gaussian_smooth");
        layer.set_value(smoothed);
        Ok(Produced::Empty)
    }
}

/// Processor smoothing the layer value in place.
pub fn gaussian_smooth(sigma: f64, mode: BoundaryMode) -> Processor {
    Processor::new(
        "gaussian_smooth",
        ProcessorKind::GaussianSmooth(GaussianSmooth { sigma, mode }),
    )
}
