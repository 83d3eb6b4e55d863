//! Global Configuration (~/.shardpack/config.toml)
//!
//! Handles user-level defaults stored in `~/.shardpack/config.toml`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.shardpack/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Default pack threshold in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_bytes: Option<u64>,

    /// Default container output root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_root: Option<PathBuf>,

    /// Verify partitions by default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            if defaults.threshold_bytes == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "defaults.threshold_bytes".to_string(),
                    reason: "threshold must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the global config file path (~/.shardpack/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".shardpack").join("config.toml"))
    }

    /// Default threshold, if set
    pub fn default_threshold(&self) -> Option<u64> {
        self.defaults.as_ref().and_then(|d| d.threshold_bytes)
    }

    /// Default output root, if set
    pub fn default_output_root(&self) -> Option<&Path> {
        self.defaults.as_ref().and_then(|d| d.output_root.as_deref())
    }

    /// Default verify setting, if set
    pub fn default_verify(&self) -> Option<bool> {
        self.defaults.as_ref().and_then(|d| d.verify)
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.defaults.is_some() {
            self.defaults = other.defaults.clone();
        }
    }
}
