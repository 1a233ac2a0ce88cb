//! Console prompting for workflow inputs.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use workflow::{InputSpec, NamedMap};

use crate::params::value_text;

/// Ask for each input on `output` and read answers from `input`.
///
/// An empty answer keeps the default. Inputs outside `only` are not asked
/// and fall back to their defaults. Only answered inputs are returned.
pub fn prompt_inputs<R: BufRead, W: Write>(
    specs: &NamedMap<InputSpec>,
    only: Option<&BTreeSet<String>>,
    input: &mut R,
    output: &mut W,
) -> Result<Map<String, Value>> {
    let mut answers = Map::new();
    for (name, spec) in specs.iter() {
        if only.is_some_and(|names| !names.contains(name)) {
            continue;
        }
        let default = spec.default.as_ref().map(value_text);
        loop {
            match &default {
                Some(default) => write!(output, "{} [{}]: ", spec.prompt_or(name), default)?,
                None => write!(output, "{}: ", spec.prompt_or(name))?,
            }
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                if default.is_some() {
                    break;
                }
                bail!("No value given for input '{}'", name);
            }
            let answer = line.trim();
            if !answer.is_empty() {
                answers.insert(name.to_string(), Value::String(answer.to_string()));
                break;
            }
            if default.is_some() {
                break;
            }
        }
    }
    Ok(answers)
}
