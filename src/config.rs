use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub tfs: Option<TfsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct TfsConfig {
    /// Collection URL, e.g. "https://tfs.example.com/DefaultCollection".
    pub collection_url: String,
    /// Default team project; overridable with --project.
    pub project: Option<String>,
    /// Personal access token used for every request, downloads included.
    pub pat: String,
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bug-export")
        .join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}
