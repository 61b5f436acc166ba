//! Override map output for the `prepare` command.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::Path;

use crate::rotation::OverrideMap;

/// Serialization used for the override map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// A vars file usable with `--vars-file`
    #[default]
    Yaml,
    Json,
}

/// Render `overrides` in `format`.
pub fn render_overrides(overrides: &OverrideMap, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(overrides).context("Failed to serialize overrides to YAML")
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(overrides).context("Failed to serialize overrides to JSON")
        }
    }
}

/// Write `overrides` to `path`, or to stdout when no path is given.
pub fn write_overrides(
    overrides: &OverrideMap,
    format: OutputFormat,
    path: Option<&Path>,
) -> Result<()> {
    let rendered = render_overrides(overrides, format)?;

    match path {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write overrides to {}", path.display())),
        None => {
            println!("{}", rendered);
            Ok(())
        }
    }
}
