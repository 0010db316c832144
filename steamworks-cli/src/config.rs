//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use steamworks_bridge::BridgeConfig;

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// What to watch and for how long
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Stop after this many seconds (default: run until shutdown or Ctrl-C)
    pub duration_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub persona: bool,
    #[serde(default = "default_true")]
    pub shutdown: bool,
    /// Print JSON lines instead of text
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            duration_secs: None,
            persona: true,
            shutdown: true,
            json: false,
        }
    }
}

impl WatchConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
