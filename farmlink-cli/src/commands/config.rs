use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use shared::config::server::Config;

/// Serializes the default server configuration as `yaml` or `json`.
///
/// # Errors
/// Returns an error for any other format.
pub fn render_config(format: &str) -> Result<String> {
    let config = Config::with_defaults();
    match format {
        "yaml" => serde_yml::to_string(&config).context("failed to serialize configuration"),
        "json" => serde_json::to_string_pretty(&config).context("failed to serialize configuration"),
        other => bail!("unsupported format '{other}'; use 'yaml' or 'json'"),
    }
}

/// Writes `config.yaml` or `config.json` into `dir`.
///
/// # Errors
/// Returns an error if the format is unsupported or writing the file fails.
pub fn generate_config(format: &str, dir: &Path) -> Result<()> {
    let rendered = render_config(format)?;
    let path = dir.join(format!("config.{format}"));
    fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(())
}
