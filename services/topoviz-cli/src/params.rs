//! Parameter files: `key=value` lines supplying workflow inputs.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use workflow::{InputSpec, NamedMap};

const HEADER: &str = "# topoviz workflow parameters";

/// `<workflow>.params`, next to the workflow file.
pub fn default_params_path(workflow: &Path) -> PathBuf {
    let mut name = OsString::from(workflow.as_os_str());
    name.push(".params");
    PathBuf::from(name)
}

/// Text form of an input value: strings unquoted, anything else as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One `name=default` line per input, in declaration order.
pub fn render_params(specs: &NamedMap<InputSpec>) -> String {
    let mut text = String::from(HEADER);
    text.push('\n');
    for (name, spec) in specs.iter() {
        let default = spec.default.as_ref().map(value_text).unwrap_or_default();
        text.push_str(&format!("{}={}\n", name, default));
    }
    text
}

pub fn write_params_file(path: &Path, specs: &NamedMap<InputSpec>) -> Result<()> {
    fs::write(path, render_params(specs))
        .with_context(|| format!("Failed to write params file {}", path.display()))
}

/// Parse `key=value` lines. Blank lines and `#` comments are skipped; values
/// stay strings and are typed later by the workflow's input declarations.
pub fn parse_params(text: &str) -> Result<Map<String, Value>> {
    let mut values = Map::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid param line '{}'. Use key=value.", line);
        };
        values.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
    }
    Ok(values)
}

pub fn read_params_file(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read params file {}", path.display()))?;
    parse_params(&text).with_context(|| format!("In params file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workflow::WorkflowSpec;

    fn specs() -> NamedMap<InputSpec> {
        let spec: WorkflowSpec = serde_json::from_value(json!({
            "inputs": {
                "dem_path": {"type": "path", "default": "dem.tif"},
                "sigma": {"type": "float", "default": 1.5},
                "label": {"type": "str"}
            }
        }))
        .unwrap();
        spec.inputs
    }

    #[test]
    fn test_default_params_path() {
        assert_eq!(
            default_params_path(Path::new("runs/flow.json")),
            PathBuf::from("runs/flow.json.params")
        );
    }

    #[test]
    fn test_render_params() {
        assert_eq!(
            render_params(&specs()),
            "# topoviz workflow parameters\ndem_path=dem.tif\nsigma=1.5\nlabel=\n"
        );
    }

    #[test]
    fn test_parse_params() {
        let values = parse_params("# header\n\n dem_path = a=b.tif \nsigma=2\n").unwrap();
        assert_eq!(values["dem_path"], json!("a=b.tif"));
        assert_eq!(values["sigma"], json!("2"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_malformed_line_rejected() {
        let err = parse_params("dem_path=a.tif\noops\n").unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json.params");
        write_params_file(&path, &specs()).unwrap();
        let values = read_params_file(&path).unwrap();
        assert_eq!(values["dem_path"], json!("dem.tif"));
        assert_eq!(values["sigma"], json!("1.5"));
        assert_eq!(values["label"], json!(""));
    }
}
