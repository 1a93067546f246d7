//! Bridge configuration, stored as JSON.

use crate::commands::CommandDefaults;
use crate::error::{BridgeError, Result};
use native_layer::{PickerConfig, Platform};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "NATIVE_BRIDGE_CONFIG";

/// Platform selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformChoice {
    /// Detect from the environment and build target.
    #[default]
    Auto,
    Simulated,
    /// Run every capability inert.
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerDefaults {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for PickerDefaults {
    fn default() -> Self {
        let picker = PickerConfig::default();
        Self {
            max_width: picker.max_width,
            max_height: picker.max_height,
            quality: picker.quality,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogDefaults {
    pub positive_label: String,
    pub negative_label: String,
}

impl Default for DialogDefaults {
    fn default() -> Self {
        Self {
            positive_label: "OK".to_string(),
            negative_label: "Cancel".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interval of the host's drain timer.
    pub poll_interval_ms: u64,
    /// Default `env_logger` filter; `RUST_LOG` wins.
    pub log_filter: String,
    /// Turn on the native layer's own logging at install.
    pub native_logging: bool,
    pub platform: PlatformChoice,
    pub picker: PickerDefaults,
    pub dialog: DialogDefaults,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            log_filter: "info".to_string(),
            native_logging: false,
            platform: PlatformChoice::Auto,
            picker: PickerDefaults::default(),
            dialog: DialogDefaults::default(),
        }
    }
}

impl BridgeConfig {
    /// `$NATIVE_BRIDGE_CONFIG`, else `<config dir>/native-bridge/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("native-bridge").join("config.json"))
    }

    /// Load from config file, or return default if missing or unreadable
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Load from the default location.
    pub fn load_default() -> Self {
        Self::default_path()
            .map(|p| Self::load(&p))
            .unwrap_or_default()
    }

    /// Save to config file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(BridgeError::config)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn resolve_platform(&self) -> Platform {
        match self.platform {
            PlatformChoice::Auto => native_layer::detect_platform(),
            PlatformChoice::Simulated => Platform::Simulated,
            PlatformChoice::None => Platform::Unsupported,
        }
    }

    pub fn command_defaults(&self) -> CommandDefaults {
        CommandDefaults {
            picker: PickerConfig {
                max_width: self.picker.max_width,
                max_height: self.picker.max_height,
                quality: self.picker.quality,
                ..PickerConfig::default()
            },
            positive_label: self.dialog.positive_label.clone(),
            negative_label: self.dialog.negative_label.clone(),
        }
    }
}
