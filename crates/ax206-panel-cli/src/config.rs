//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Frame selector ("usb0" .. "usb9" or "dpf0" .. "dpf9")
    #[serde(default = "default_device")]
    pub device: String,

    /// Backlight level (0-7) applied after opening, if set
    #[serde(default)]
    pub backlight: Option<u16>,

    /// Poll interval for `watch` in milliseconds
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,

    /// Logical canvas configuration
    #[serde(default)]
    pub canvas: CanvasConfig,
}

/// Logical canvas size. Unset dimensions follow the panel.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CanvasConfig {
    /// Canvas width
    #[serde(default)]
    pub width: Option<u16>,

    /// Canvas height
    #[serde(default)]
    pub height: Option<u16>,
}

impl CanvasConfig {
    /// Resolves the canvas size against the panel size.
    pub fn resolve(&self, panel_width: u16, panel_height: u16) -> (u16, u16) {
        (
            self.width.unwrap_or(panel_width),
            self.height.unwrap_or(panel_height),
        )
    }
}

// Default value functions
fn default_device() -> String {
    "usb0".to_string()
}

fn default_watch_interval() -> u64 {
    500
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.watch_interval_ms > 0,
            "watch_interval_ms must be greater than 0"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: default_device(),
            backlight: None,
            watch_interval_ms: default_watch_interval(),
            canvas: CanvasConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.device, "usb0");
        assert_eq!(config.watch_interval_ms, 500);
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            device = "dpf1"
            backlight = 4
            watch_interval_ms = 250

            [canvas]
            width = 960
            "#,
        )
        .unwrap();
        assert_eq!(config.device, "dpf1");
        assert_eq!(config.backlight, Some(4));
        assert_eq!(config.watch_interval_ms, 250);
        assert_eq!(config.canvas.resolve(480, 320), (960, 320));
    }

    #[test]
    fn test_zero_watch_interval_rejected() {
        let config: Config = toml::from_str("watch_interval_ms = 0").unwrap();
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());

        let path = std::env::temp_dir().join(format!("ax206-zero-{}.toml", std::process::id()));
        std::fs::write(&path, "watch_interval_ms = 0").unwrap();
        let result = Config::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/ax206.toml").is_err());
    }
}
