//! Configuration file management.
//!
//! Loads TOML configuration files and provides input settings.
//! Default config path: ~/.config/evseat/input.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Keyboard settings
    pub keyboard: KeyboardInputConfig,
    /// Pointer settings
    pub pointer: PointerInputConfig,
}

/// Keyboard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardInputConfig {
    /// XKB keyboard model (empty = default)
    pub xkb_model: String,
    /// XKB layout, e.g. "us", "jp" (empty = default)
    pub xkb_layout: String,
    /// XKB layout variant (empty = default)
    pub xkb_variant: String,
    /// XKB options, e.g. "ctrl:nocaps" (empty = default)
    pub xkb_options: String,
    /// Key repeat delay in milliseconds
    pub repeat_delay: u64,
    /// Key repeat rate in milliseconds
    pub repeat_rate: u64,
    /// Key repeat enabled
    pub repeat_enabled: bool,
}

impl Default for KeyboardInputConfig {
    fn default() -> Self {
        Self {
            xkb_model: String::new(),
            xkb_layout: String::new(),
            xkb_variant: String::new(),
            xkb_options: String::new(),
            repeat_delay: 400,
            repeat_rate: 30,
            repeat_enabled: true,
        }
    }
}

/// Pointer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerInputConfig {
    /// Pointer acceleration speed in [-1.0, 1.0] (0.0 = unaccelerated)
    pub accel_speed: f64,
}

impl Default for PointerInputConfig {
    fn default() -> Self {
        Self { accel_speed: 0.0 }
    }
}

impl InputConfig {
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/evseat/input.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. EVSEAT_CONFIG environment variable
        if let Ok(path) = std::env::var("EVSEAT_CONFIG") {
            let p = std::path::Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/evseat/input.toml
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("evseat").join("input.toml");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/evseat/input.toml
        let system_config = std::path::Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. EVSEAT_CONFIG environment variable
    /// 2. ~/.config/evseat/input.toml (user config)
    /// 3. /etc/evseat/input.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(path.to_string_lossy().as_ref()) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: InputConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = InputConfig::default();
        assert!(config.keyboard.repeat_enabled);
        assert_eq!(config.keyboard.repeat_delay, 400);
        assert_eq!(config.keyboard.repeat_rate, 30);
        assert_eq!(config.pointer.accel_speed, 0.0);
        assert!(config.keyboard.xkb_layout.is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: InputConfig = toml::from_str(
            r#"
            [keyboard]
            xkb_layout = "jp"
            repeat_delay = 250

            [pointer]
            accel_speed = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.keyboard.xkb_layout, "jp");
        assert_eq!(config.keyboard.repeat_delay, 250);
        assert_eq!(config.keyboard.repeat_rate, 30);
        assert_eq!(config.pointer.accel_speed, 0.5);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: InputConfig = toml::from_str("").unwrap();
        assert_eq!(config.keyboard.repeat_delay, 400);
    }
}
