//! Processors: named, parameterized transformations over a [`Layer`].
//!
//! Built-in processors are tagged variants of [`ProcessorKind`], each
//! carrying its own parameter struct. User-defined processors wrap a
//! closure and an open parameter map ([`ProcessorKind::Custom`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use topoviz_common::{Result, TopovizError};

use crate::layer::Layer;
use crate::processors::{
    GaussianSmooth, Hillshade, LightingAdjust, LightingControl, Multishade, NanAbove, NanBelow,
    NanEqual, NanMask, Scale,
};

/// Render mode a processor is being expanded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderMode {
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
    /// No filtering: every processor runs.
    #[default]
    #[serde(rename = "any")]
    Any,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::TwoD => write!(f, "2d"),
            RenderMode::ThreeD => write!(f, "3d"),
            RenderMode::Any => write!(f, "any"),
        }
    }
}

impl FromStr for RenderMode {
    type Err = TopovizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "2d" | "fig2d" => Ok(RenderMode::TwoD),
            "3d" | "fig3d" => Ok(RenderMode::ThreeD),
            "any" | "all" => Ok(RenderMode::Any),
            other => Err(TopovizError::invalid_parameter(
                "mode",
                format!("expected '2d', '3d' or 'any', got '{}'", other),
            )),
        }
    }
}

/// What a processor invocation produced.
#[derive(Debug, Default)]
pub enum Produced {
    /// The layer was mutated in place (or left alone).
    #[default]
    Empty,
    /// One derived layer.
    Single(Layer),
    /// Several derived layers, in order.
    Many(Vec<Layer>),
}

impl Produced {
    pub fn len(&self) -> usize {
        match self {
            Produced::Empty => 0,
            Produced::Single(_) => 1,
            Produced::Many(layers) => layers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_layers(self) -> Vec<Layer> {
        match self {
            Produced::Empty => Vec::new(),
            Produced::Single(layer) => vec![layer],
            Produced::Many(layers) => layers,
        }
    }
}

impl From<Layer> for Produced {
    fn from(layer: Layer) -> Self {
        Produced::Single(layer)
    }
}

impl From<Vec<Layer>> for Produced {
    fn from(layers: Vec<Layer>) -> Self {
        Produced::Many(layers)
    }
}

impl IntoIterator for Produced {
    type Item = Layer;
    type IntoIter = std::vec::IntoIter<Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_layers().into_iter()
    }
}

/// A single built-in transformation.
pub trait Process {
    fn process(&self, layer: &mut Layer) -> Result<Produced>;
}

/// A parameter value of a custom processor.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Any JSON-representable value.
    Json(Value),
    /// A float array; not serializable to a workflow.
    Array(Array2<f32>),
    /// A boolean array; not serializable to a workflow.
    Mask(Array2<bool>),
}

impl ParamValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParamValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Json(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Json(Value::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Json(Value::Bool(v))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Json(Value::String(v.to_string()))
    }
}

impl From<Array2<f32>> for ParamValue {
    fn from(v: Array2<f32>) -> Self {
        ParamValue::Array(v)
    }
}

impl From<Array2<bool>> for ParamValue {
    fn from(v: Array2<bool>) -> Self {
        ParamValue::Mask(v)
    }
}

/// Invocation function of a custom processor.
pub type ProcessFn = Arc<dyn Fn(&Processor, &mut Layer) -> Result<Produced> + Send + Sync>;

/// A user-defined processor: a closure plus an open parameter bag.
#[derive(Clone)]
pub struct CustomProcessor {
    apply: ProcessFn,
    params: BTreeMap<String, ParamValue>,
}

impl CustomProcessor {
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }
}

impl fmt::Debug for CustomProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomProcessor")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Parameters of every processor kind.
#[derive(Debug, Clone)]
pub enum ProcessorKind {
    NanEqual(NanEqual),
    NanBelow(NanBelow),
    NanAbove(NanAbove),
    NanMask(NanMask),
    GaussianSmooth(GaussianSmooth),
    Hillshade(Hillshade),
    Multishade(Multishade),
    Scale(Scale),
    LightingControl(LightingControl),
    LightingAdjust(LightingAdjust),
    Custom(CustomProcessor),
}

impl ProcessorKind {
    fn encode<T: Serialize>(params: &T) -> Map<String, Value> {
        match serde_json::to_value(params) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// JSON-safe parameters of this kind.
    fn json_params(&self) -> Map<String, Value> {
        match self {
            ProcessorKind::NanEqual(p) => Self::encode(p),
            ProcessorKind::NanBelow(p) => Self::encode(p),
            ProcessorKind::NanAbove(p) => Self::encode(p),
            ProcessorKind::NanMask(p) => Self::encode(p),
            ProcessorKind::GaussianSmooth(p) => Self::encode(p),
            ProcessorKind::Hillshade(p) => Self::encode(p),
            ProcessorKind::Multishade(p) => Self::encode(p),
            ProcessorKind::Scale(p) => Self::encode(p),
            ProcessorKind::LightingControl(p) => Self::encode(p),
            ProcessorKind::LightingAdjust(p) => Self::encode(p),
            ProcessorKind::Custom(c) => c
                .params
                .iter()
                .filter_map(|(k, v)| v.as_json().map(|v| (k.clone(), v.clone())))
                .collect(),
        }
    }

    /// Rebuild the same kind from a parameter map.
    fn with_params(&self, params: Map<String, Value>) -> Result<Self> {
        Ok(match self {
            ProcessorKind::NanEqual(_) => ProcessorKind::NanEqual(decode_params(params)?),
            ProcessorKind::NanBelow(_) => ProcessorKind::NanBelow(decode_params(params)?),
            ProcessorKind::NanAbove(_) => ProcessorKind::NanAbove(decode_params(params)?),
            ProcessorKind::NanMask(current) => {
                let mut next: NanMask = decode_params(params)?;
                if next.mask.is_empty() {
                    next.mask = current.mask.clone();
                }
                ProcessorKind::NanMask(next)
            }
            ProcessorKind::GaussianSmooth(_) => {
                ProcessorKind::GaussianSmooth(decode_params(params)?)
            }
            ProcessorKind::Hillshade(_) => ProcessorKind::Hillshade(decode_params(params)?),
            ProcessorKind::Multishade(_) => ProcessorKind::Multishade(decode_params(params)?),
            ProcessorKind::Scale(_) => ProcessorKind::Scale(decode_params(params)?),
            ProcessorKind::LightingControl(_) => {
                ProcessorKind::LightingControl(decode_params(params)?)
            }
            ProcessorKind::LightingAdjust(_) => {
                ProcessorKind::LightingAdjust(decode_params(params)?)
            }
            ProcessorKind::Custom(c) => {
                let mut custom = c.clone();
                for (k, v) in params {
                    custom.params.insert(k, ParamValue::Json(v));
                }
                ProcessorKind::Custom(custom)
            }
        })
    }
}

/// Deserialize a kind's parameter struct, mapping failures to `InvalidParameter`.
pub fn decode_params<T: DeserializeOwned>(params: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| TopovizError::invalid_parameter("params", e.to_string()))
}

/// A named, parameterized transformation attached to a layer.
#[derive(Debug, Clone)]
pub struct Processor {
    name: String,
    kind: ProcessorKind,
    recursive: bool,
    compatible_2d: bool,
    compatible_3d: bool,
}

impl Processor {
    pub(crate) fn new(name: &str, kind: ProcessorKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            recursive: true,
            compatible_2d: true,
            compatible_3d: true,
        }
    }

    pub(crate) fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub(crate) fn only_3d(mut self) -> Self {
        self.compatible_2d = false;
        self.compatible_3d = true;
        self
    }

    /// Name used for registry lookup and serialization.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ProcessorKind {
        &self.kind
    }

    /// Typed access to the parameters for post-construction tuning.
    pub fn kind_mut(&mut self) -> &mut ProcessorKind {
        &mut self.kind
    }

    /// Capability flag: whether the transformation makes sense on derived layers.
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn compatible_2d(&self) -> bool {
        self.compatible_2d
    }

    pub fn compatible_3d(&self) -> bool {
        self.compatible_3d
    }

    pub fn set_compatibility(&mut self, compatible_2d: bool, compatible_3d: bool) {
        self.compatible_2d = compatible_2d;
        self.compatible_3d = compatible_3d;
    }

    pub fn compatible_with(&self, mode: RenderMode) -> bool {
        match mode {
            RenderMode::TwoD => self.compatible_2d,
            RenderMode::ThreeD => self.compatible_3d,
            RenderMode::Any => true,
        }
    }

    /// Invoke the processor on `layer`.
    pub fn apply(&self, layer: &mut Layer) -> Result<Produced> {
        match &self.kind {
            ProcessorKind::NanEqual(p) => p.process(layer),
            ProcessorKind::NanBelow(p) => p.process(layer),
            ProcessorKind::NanAbove(p) => p.process(layer),
            ProcessorKind::NanMask(p) => p.process(layer),
            ProcessorKind::GaussianSmooth(p) => p.process(layer),
            ProcessorKind::Hillshade(p) => p.process(layer),
            ProcessorKind::Multishade(p) => p.process(layer),
            ProcessorKind::Scale(p) => p.process(layer),
            ProcessorKind::LightingControl(p) => p.process(layer),
            ProcessorKind::LightingAdjust(p) => p.process(layer),
            ProcessorKind::Custom(c) => (c.apply)(self, layer),
        }
    }

    /// JSON-safe parameters, as written to workflow documents.
    pub fn params(&self) -> Map<String, Value> {
        self.kind.json_params()
    }

    pub fn param(&self, key: &str) -> Option<Value> {
        self.params().remove(key)
    }

    /// Raw parameter of a custom processor, including array values.
    pub fn custom_param(&self, key: &str) -> Option<&ParamValue> {
        match &self.kind {
            ProcessorKind::Custom(c) => c.params.get(key),
            _ => None,
        }
    }

    /// Overwrite one parameter, validating it against the kind's schema.
    pub fn set_param(&mut self, key: &str, value: Value) -> Result<()> {
        let mut params = self.params();
        params.insert(key.to_string(), value);
        self.kind = self.kind.with_params(params)?;
        Ok(())
    }

    /// Replace the JSON parameters wholesale; missing keys take the kind's defaults.
    pub(crate) fn replace_params(&mut self, params: Map<String, Value>) -> Result<()> {
        self.kind = self.kind.with_params(params)?;
        Ok(())
    }

    /// Names of parameters that cannot be written to a workflow document.
    pub fn non_json_params(&self) -> Vec<String> {
        match &self.kind {
            ProcessorKind::NanMask(_) => vec!["mask".to_string()],
            ProcessorKind::Custom(c) => c
                .params
                .iter()
                .filter(|(_, v)| v.as_json().is_none())
                .map(|(k, _)| k.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Builds custom processors from a closure and a parameter bag.
pub struct ProcessorFactory;

impl ProcessorFactory {
    /// Create a processor around `apply`.
    ///
    /// Every entry of `params` is readable from inside `apply` through
    /// [`Processor::custom_param`] and tunable with [`Processor::set_param`].
    pub fn build<F, I, K>(
        name: &str,
        apply: F,
        recursive: bool,
        compatible_2d: bool,
        compatible_3d: bool,
        params: I,
    ) -> Processor
    where
        F: Fn(&Processor, &mut Layer) -> Result<Produced> + Send + Sync + 'static,
        I: IntoIterator<Item = (K, ParamValue)>,
        K: Into<String>,
    {
        let custom = CustomProcessor {
            apply: Arc::new(apply),
            params: params.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        Processor {
            name: name.to_string(),
            kind: ProcessorKind::Custom(custom),
            recursive,
            compatible_2d,
            compatible_3d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{gaussian_smooth, nan_below, scale};
    use ndarray::array;
    use serde_json::json;
    use topoviz_common::{BoundaryMode, RasterGrid};

    fn layer() -> Layer {
        Layer::from_grid(RasterGrid::new(array![[1.0f32, 2.0], [3.0, 4.0]], 1.0))
    }

    #[test]
    fn test_render_mode_parse() {
        assert_eq!("fig2d".parse::<RenderMode>().unwrap(), RenderMode::TwoD);
        assert_eq!("3D".parse::<RenderMode>().unwrap(), RenderMode::ThreeD);
        assert!("4d".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_compatibility() {
        let p = scale(2.0);
        assert!(!p.compatible_with(RenderMode::TwoD));
        assert!(p.compatible_with(RenderMode::ThreeD));
        assert!(p.compatible_with(RenderMode::Any));
    }

    #[test]
    fn test_set_param_round_trips_through_schema() {
        let mut p = gaussian_smooth(1.0, BoundaryMode::Nearest);
        p.set_param("sigma", json!(2.5)).unwrap();
        assert_eq!(p.param("sigma"), Some(json!(2.5)));
        assert_eq!(p.param("mode"), Some(json!("nearest")));

        let err = p.set_param("sigma", json!("wide")).unwrap_err();
        assert!(matches!(err, TopovizError::InvalidParameter { .. }));
        let err = p.set_param("bogus", json!(1)).unwrap_err();
        assert!(matches!(err, TopovizError::InvalidParameter { .. }));
    }

    #[test]
    fn test_kind_mut_tuning() {
        let mut p = nan_below(0.0);
        if let ProcessorKind::NanBelow(params) = p.kind_mut() {
            params.threshold = 2.5;
        }
        let mut l = layer();
        p.apply(&mut l).unwrap();
        assert!(l.value()[[0, 1]].is_nan());
        assert_eq!(l.value()[[1, 0]], 3.0);
    }

    #[test]
    fn test_custom_processor_reads_params() {
        let p = ProcessorFactory::build(
            "offset",
            |proc, layer| {
                let by = proc.custom_param("by").and_then(ParamValue::as_f64).unwrap_or(0.0) as f32;
                let shifted = layer.value().mapv(|v| v + by);
                layer.set_value(shifted);
                Ok(Produced::Empty)
            },
            true,
            true,
            false,
            [("by", ParamValue::from(10.0))],
        );
        let mut l = layer();
        assert!(p.apply(&mut l).unwrap().is_empty());
        assert_eq!(l.value()[[0, 0]], 11.0);
        assert!(!p.compatible_with(RenderMode::ThreeD));
        assert_eq!(p.params().get("by"), Some(&json!(10.0)));
    }

    #[test]
    fn test_custom_non_json_params() {
        let p = ProcessorFactory::build(
            "weights",
            |_, _| Ok(Produced::Empty),
            true,
            true,
            true,
            [
                ("w", ParamValue::from(array![[1.0f32]])),
                ("label", ParamValue::from("x")),
            ],
        );
        assert_eq!(p.non_json_params(), vec!["w".to_string()]);
        assert_eq!(p.params().len(), 1);
        assert!(p.custom_param("w").is_some());
    }

    #[test]
    fn test_produced_conversions() {
        assert_eq!(Produced::from(layer()).len(), 1);
        assert_eq!(Produced::from(vec![layer(), layer()]).into_layers().len(), 2);
        assert!(Produced::default().is_empty());
    }
}
