//! Runtime inputs: typed parsing, defaults and `$ref` substitution.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use topoviz_common::{Result, TopovizError};
use tracing::debug;

use crate::spec::WorkflowSpec;

/// Key of an indirect reference object, `{"$ref": "<input name>"}`.
pub const REF_KEY: &str = "$ref";

/// Declared type of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Path,
    Str,
    Int,
    Float,
    Bool,
    Json,
    /// Unrecognized type name; values pass through untouched.
    Raw,
}

impl InputType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "path" => InputType::Path,
            "str" | "string" => InputType::Str,
            "int" => InputType::Int,
            "float" => InputType::Float,
            "bool" => InputType::Bool,
            "json" => InputType::Json,
            _ => InputType::Raw,
        }
    }
}

fn bad_value(name: &str, raw: &Value, kind: &str) -> TopovizError {
    TopovizError::invalid_parameter(name, format!("invalid {} value: {}", kind, raw))
}

/// Text of a scalar without JSON quoting.
fn as_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a caller-provided value of input `name` according to `kind`.
pub fn parse_value(name: &str, raw: &Value, kind: InputType) -> Result<Value> {
    match kind {
        InputType::Path | InputType::Str => Ok(Value::String(as_text(raw))),
        InputType::Int => {
            let parsed = match raw {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Bool(b) => Some(*b as i64),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| bad_value(name, raw, "int"))
        }
        InputType::Float => {
            let parsed = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            parsed
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| bad_value(name, raw, "float"))
        }
        InputType::Bool => {
            if let Value::Bool(b) = raw {
                return Ok(Value::Bool(*b));
            }
            match as_text(raw).trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "n" => Ok(Value::Bool(false)),
                _ => Err(bad_value(name, raw, "bool")),
            }
        }
        InputType::Json => match raw {
            Value::String(s) => serde_json::from_str(s).map_err(|e| {
                TopovizError::invalid_parameter(name, format!("invalid json value: {}", e))
            }),
            other => Ok(other.clone()),
        },
        InputType::Raw => Ok(raw.clone()),
    }
}

/// Fail with every input lacking a default, sorted by name.
pub fn validate_defaults(spec: &WorkflowSpec) -> Result<()> {
    let mut missing: Vec<String> = spec
        .inputs
        .iter()
        .filter(|(_, input)| input.default.is_none())
        .map(|(name, _)| name.to_string())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort();
    Err(TopovizError::MissingDefault(missing))
}

/// Resolve every declared input from `provided`, else from its default.
///
/// Provided keys that no input declares are ignored.
pub fn resolve_inputs(spec: &WorkflowSpec, provided: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut resolved = Map::new();
    for (name, input) in spec.inputs.iter() {
        let value = match (provided.get(name), &input.default) {
            (Some(raw), _) => parse_value(name, raw, InputType::from_name(&input.kind))?,
            (None, Some(default)) => default.clone(),
            (None, None) => return Err(TopovizError::MissingInput(name.to_string())),
        };
        resolved.insert(name.to_string(), value);
    }
    for key in provided.keys().filter(|k| !spec.inputs.contains_key(k)) {
        debug!(input = %key, "Ignoring value for undeclared input");
    }
    Ok(resolved)
}

/// Input name referenced by `value`, when it is a `$ref` object.
pub fn ref_target(value: &Value) -> Option<&str> {
    value.as_object()?.get(REF_KEY)?.as_str()
}

/// Substitute a `$ref` object with the referenced input value.
pub fn resolve_param(value: &Value, inputs: &Map<String, Value>) -> Result<Value> {
    let Some(reference) = value.as_object().and_then(|o| o.get(REF_KEY)) else {
        return Ok(value.clone());
    };
    let name = reference
        .as_str()
        .ok_or_else(|| TopovizError::invalid_parameter(REF_KEY, "reference must be an input name"))?;
    inputs
        .get(name)
        .cloned()
        .ok_or_else(|| TopovizError::MissingInput(name.to_string()))
}

/// [`resolve_param`] over a whole parameter object.
pub fn resolve_params(params: &Map<String, Value>, inputs: &Map<String, Value>) -> Result<Map<String, Value>> {
    params
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_param(v, inputs)?)))
        .collect()
}

fn collect_refs(value: &Value, refs: &mut BTreeSet<String>) {
    if let Some(name) = ref_target(value) {
        refs.insert(name.to_string());
        return;
    }
    match value {
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, refs)),
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, refs)),
        _ => {}
    }
}

/// Inputs referenced anywhere inside data-source parameters, i.e. the ones
/// that decide which grids get loaded.
pub fn loader_inputs(spec: &WorkflowSpec) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for (_, source) in spec.data_sources.iter() {
        source.params.values().for_each(|v| collect_refs(v, &mut refs));
    }
    refs
}
