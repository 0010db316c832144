//! Session configuration types
//!
//! This module defines the small amount of configuration the session client
//! needs: where to find the steam_api library, how often to pump callbacks,
//! and optionally which app id to run as.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for [`Client::init`](crate::Client::init)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Explicit path to the steam_api shared library (default: platform library name)
    #[serde(default)]
    pub library_path: Option<PathBuf>,

    /// Interval between manual-dispatch frames in milliseconds (default: 5ms)
    #[serde(default = "default_pump_interval")]
    pub pump_interval_ms: u64,

    /// App id exported as `SteamAppId` before init, instead of `steam_appid.txt`
    ///
    /// Exporting mutates the process environment, which is only sound while no
    /// other thread reads it: initialize the client before spawning threads.
    #[serde(default)]
    pub app_id: Option<u32>,
}

fn default_pump_interval() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            pump_interval_ms: default_pump_interval(),
            app_id: None,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: load the library from an explicit path
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Builder method: set the pump cadence
    pub fn with_pump_interval_ms(mut self, interval_ms: u64) -> Self {
        self.pump_interval_ms = interval_ms;
        self
    }

    /// Builder method: run as the given app id
    pub fn with_app_id(mut self, app_id: u32) -> Self {
        self.app_id = Some(app_id);
        self
    }

    /// Pump cadence as a `Duration`, never shorter than one millisecond
    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms.max(1))
    }

    /// The library to hand to the loader
    pub fn library(&self) -> &Path {
        self.library_path
            .as_deref()
            .unwrap_or_else(|| Path::new(default_library_name()))
    }
}

/// File name of the steam_api redistributable for the current target
pub fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        if cfg!(target_pointer_width = "64") {
            "steam_api64.dll"
        } else {
            "steam_api.dll"
        }
    } else if cfg!(target_os = "macos") {
        "libsteam_api.dylib"
    } else {
        "libsteam_api.so"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_config_builder() {
        let config = BridgeConfig::new()
            .with_library_path("/opt/steam/libsteam_api.so")
            .with_pump_interval_ms(16)
            .with_app_id(480);

        assert_eq!(config.library(), Path::new("/opt/steam/libsteam_api.so"));
        assert_eq!(config.pump_interval(), Duration::from_millis(16));
        assert_eq!(config.app_id, Some(480));
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::new();
        assert_eq!(config.pump_interval_ms, 5);
        assert_eq!(config.library(), Path::new(default_library_name()));
        assert!(config.app_id.is_none());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = BridgeConfig::new().with_pump_interval_ms(0);
        assert_eq!(config.pump_interval(), Duration::from_millis(1));
    }
}
