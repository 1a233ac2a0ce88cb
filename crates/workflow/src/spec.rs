//! Typed view of a workflow document.
//!
//! Every optional key has a serde default. Keys this crate does not know
//! are kept in the `extra` map of the enclosing section and written back
//! unchanged.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use pipeline::Lighting;
use renderer::{CameraPosition, ColorSpec};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use topoviz_common::{Result, TopovizError};

/// Document format version written by this crate.
pub const WORKFLOW_VERSION: u32 = 1;

/// Input type used when an input declares none.
pub const DEFAULT_INPUT_TYPE: &str = "str";

/// Insertion-ordered `name -> T` map, serialized as a JSON object.
///
/// Inputs are prompted for in declaration order, so the order of the
/// document has to survive parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedMap<T> {
    entries: IndexMap<String, T>,
}

impl<T> Default for NamedMap<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T> NamedMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`, keeping its original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for NamedMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn default_version() -> u32 {
    WORKFLOW_VERSION
}

fn default_input_type() -> String {
    DEFAULT_INPUT_TYPE.to_string()
}

fn default_cmap() -> String {
    pipeline::layer::DEFAULT_CMAP.to_string()
}

fn default_alpha() -> f64 {
    1.0
}

fn default_ambient() -> f64 {
    Lighting::default().ambient
}

fn default_diffuse() -> f64 {
    Lighting::default().diffuse
}

fn default_specular() -> f64 {
    Lighting::default().specular
}

fn default_specular_power() -> f64 {
    Lighting::default().specular_power
}

/// Keeps an explicit `null` as `Some(Value::Null)`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// A whole workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,
    #[serde(default)]
    pub inputs: NamedMap<InputSpec>,
    #[serde(default)]
    pub data_sources: NamedMap<DataSourceSpec>,
    #[serde(default)]
    pub maps: Vec<MapSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fig2d: Option<Fig2dSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fig3d: Option<Fig3dSpec>,
    #[serde(default)]
    pub run: RunSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WorkflowSpec {
    fn default() -> Self {
        Self {
            version: WORKFLOW_VERSION,
            interactive: None,
            inputs: NamedMap::new(),
            data_sources: NamedMap::new(),
            maps: Vec::new(),
            fig2d: None,
            fig3d: None,
            run: RunSpec::default(),
            extra: Map::new(),
        }
    }
}

/// A runtime input: a typed value the user may override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// `path`, `str`, `int`, `float`, `bool` or `json`.
    #[serde(rename = "type", default = "default_input_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InputSpec {
    /// A `path` input with a prompt and a default.
    pub fn path(prompt: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            kind: "path".to_string(),
            prompt: Some(prompt.into()),
            required: true,
            default: Some(Value::String(default.into())),
            extra: Map::new(),
        }
    }

    /// Prompt text, falling back to the input name.
    pub fn prompt_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.prompt.as_deref().unwrap_or(name)
    }
}

/// A named grid loaded by a registered loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub loader: String,
    /// Loader keyword parameters; values may be `{"$ref": input}`.
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A layer declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Data source key.
    #[serde(default)]
    pub data: String,
    #[serde(default = "default_cmap")]
    pub cmap: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmax: Option<f64>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub cbar: Option<String>,
    #[serde(default)]
    pub draped: bool,
    #[serde(default = "default_ambient")]
    pub ambient: f64,
    #[serde(default = "default_diffuse")]
    pub diffuse: f64,
    #[serde(default = "default_specular")]
    pub specular: f64,
    #[serde(default = "default_specular_power")]
    pub specular_power: f64,
    #[serde(default)]
    pub smooth_shading: Option<bool>,
    #[serde(default)]
    pub eye_dome_lighting: Option<bool>,
    #[serde(default)]
    pub light_azimuth: Option<f64>,
    #[serde(default)]
    pub light_elevation: Option<f64>,
    #[serde(default)]
    pub light_intensity: Option<f64>,
    #[serde(default)]
    pub processors: Vec<ProcessorSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapSpec {
    /// A map over `data` with every display default.
    pub fn new(data: impl Into<String>) -> Self {
        let lighting = Lighting::default();
        Self {
            name: None,
            data: data.into(),
            cmap: default_cmap(),
            vmin: None,
            vmax: None,
            alpha: 1.0,
            cbar: None,
            draped: false,
            ambient: lighting.ambient,
            diffuse: lighting.diffuse,
            specular: lighting.specular,
            specular_power: lighting.specular_power,
            smooth_shading: None,
            eye_dome_lighting: None,
            light_azimuth: None,
            light_elevation: None,
            light_intensity: None,
            processors: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn lighting(&self) -> Lighting {
        Lighting {
            ambient: self.ambient,
            diffuse: self.diffuse,
            specular: self.specular,
            specular_power: self.specular_power,
            smooth_shading: self.smooth_shading,
            eye_dome_lighting: self.eye_dome_lighting,
            light_azimuth: self.light_azimuth,
            light_elevation: self.light_elevation,
            light_intensity: self.light_intensity,
        }
    }

    pub fn set_lighting(&mut self, lighting: &Lighting) {
        self.ambient = lighting.ambient;
        self.diffuse = lighting.diffuse;
        self.specular = lighting.specular;
        self.specular_power = lighting.specular_power;
        self.smooth_shading = lighting.smooth_shading;
        self.eye_dome_lighting = lighting.eye_dome_lighting;
        self.light_azimuth = lighting.light_azimuth;
        self.light_elevation = lighting.light_elevation;
        self.light_intensity = lighting.light_intensity;
    }
}

/// A processor attached to a map, by registry name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// 2D figure settings and recorded axis actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fig2dSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figsize: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Raw action objects, decoded when the workflow runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 3D scene settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fig3dSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<ColorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smooth_shading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_scalar_bar: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_dome_lighting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_exaggeration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_position: Option<CameraPosition>,
    /// Name of a map whose geometry draped roots inherit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<(u32, u32)>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Run section: which renderer(s) to drive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Renderer selection of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Fig2d,
    Fig3d,
    Both,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Fig2d => "fig2d",
            RunMode::Fig3d => "fig3d",
            RunMode::Both => "both",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = TopovizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fig2d" | "2d" => Ok(RunMode::Fig2d),
            "fig3d" | "3d" => Ok(RunMode::Fig3d),
            "both" => Ok(RunMode::Both),
            other => Err(TopovizError::invalid_parameter(
                "run.mode",
                format!("'{}' must be 'fig2d', 'fig3d', or 'both'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document_defaults() {
        let spec: WorkflowSpec = serde_json::from_value(json!({
            "data_sources": {"dem": {"loader": "numpy", "params": {"path": "a.npy"}}},
            "maps": [{"data": "dem"}]
        }))
        .unwrap();
        assert_eq!(spec.version, WORKFLOW_VERSION);
        assert!(spec.inputs.is_empty());
        let map = &spec.maps[0];
        assert_eq!(map.cmap, "terrain");
        assert_eq!(map.alpha, 1.0);
        assert_eq!(map.lighting(), Lighting::default());
        assert!(spec.run.mode.is_none());
    }

    #[test]
    fn test_input_order_and_null_default() {
        let spec: WorkflowSpec = serde_json::from_value(json!({
            "inputs": {
                "zeta": {"type": "float", "default": 1.5},
                "alpha": {"type": "json", "default": null},
                "mid": {"prompt": "no default"}
            }
        }))
        .unwrap();
        let names: Vec<&str> = spec.inputs.keys().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(spec.inputs.get("alpha").unwrap().default, Some(Value::Null));
        let mid = spec.inputs.get("mid").unwrap();
        assert_eq!(mid.default, None);
        assert_eq!(mid.kind, "str");
        assert_eq!(mid.prompt_or("mid"), "no default");
    }

    #[test]
    fn test_unknown_keys_survive() {
        let doc = json!({
            "version": 1,
            "author": "someone",
            "inputs": {"p": {"type": "path", "default": "x.tif", "help": "DEM file"}},
            "data_sources": {},
            "maps": [{"name": "dem", "data": "dem", "label_color": "red", "processors": []}],
            "fig3d": {"auto_close": true},
            "run": {"mode": "fig3d", "repeat": 2}
        });
        let spec: WorkflowSpec = serde_json::from_value(doc).unwrap();
        assert_eq!(spec.extra["author"], json!("someone"));
        assert_eq!(spec.inputs.get("p").unwrap().extra["help"], json!("DEM file"));
        assert_eq!(spec.maps[0].extra["label_color"], json!("red"));

        let out = serde_json::to_value(&spec).unwrap();
        assert_eq!(out["author"], json!("someone"));
        assert_eq!(out["fig3d"]["auto_close"], json!(true));
        assert_eq!(out["run"], json!({"mode": "fig3d", "repeat": 2}));
    }

    #[test]
    fn test_named_map_replace_keeps_position() {
        let mut map = NamedMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.insert("a", 3), Some(1));
        let entries: Vec<(&str, &i32)> = map.iter().collect();
        assert_eq!(entries, vec![("a", &3), ("b", &2)]);
    }

    #[test]
    fn test_named_map_json_keeps_document_order() {
        let map: NamedMap<u32> = serde_json::from_str(r#"{"z": 1, "a": 2, "z": 3}"#).unwrap();
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(map.get("z"), Some(&3));
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"z":3,"a":2}"#);

        let err = serde_json::from_str::<NamedMap<u32>>("[1, 2]").unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("fig2d".parse::<RunMode>().unwrap(), RunMode::Fig2d);
        assert_eq!(" Both ".parse::<RunMode>().unwrap(), RunMode::Both);
        let err = "fig4d".parse::<RunMode>().unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
    }

    #[test]
    fn test_fig3d_camera_round_trip() {
        let spec: Fig3dSpec = serde_json::from_value(json!({
            "background": [0.1, 0.2, 0.3],
            "camera_position": [[1.0, 2.0, 3.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]
        }))
        .unwrap();
        let camera = spec.camera_position.unwrap();
        assert_eq!(camera.view_up(), [0.0, 0.0, 1.0]);
        assert_eq!(spec.background, Some(ColorSpec::Components(vec![0.1, 0.2, 0.3])));
    }
}
