//! Environment defaults for the CLI.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use workflow::RunMode;

/// Defaults read from the environment; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliConfig {
    /// Base directory for relative `save_path` / `screenshot_path` values.
    pub output_dir: Option<PathBuf>,
    pub mode: Option<RunMode>,
}

impl CliConfig {
    /// Load from `TOPOVIZ_OUTPUT_DIR` and `TOPOVIZ_MODE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let output_dir = non_empty("TOPOVIZ_OUTPUT_DIR").map(PathBuf::from);
        let mode = non_empty("TOPOVIZ_MODE")
            .map(|v| v.trim().parse::<RunMode>())
            .transpose()
            .context("Invalid TOPOVIZ_MODE")?;

        Ok(Self { output_dir, mode })
    }
}
