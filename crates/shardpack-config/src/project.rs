//! Project Configuration (shardpack.toml)
//!
//! Handles project-level packing configuration stored in `shardpack.toml`
//! at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from shardpack.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Container output settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    /// Size-threshold packing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_pack: Option<SizePackConfig>,

    /// Dependency deduplication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup: Option<DedupConfig>,

    /// Artifact kind capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<KindsConfig>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Root directory for container files (default: "build/packs")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Write `<bundle>.groups.json` next to the containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_manifest: Option<bool>,
}

/// Size-threshold packing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SizePackConfig {
    /// Enable size-threshold packing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Largest serialized size (bytes) an artifact may have to be packed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_bytes: Option<u64>,

    /// Artifact kinds eligible for packing
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub eligible_kinds: Vec<String>,
}

/// Dependency deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// Enable dependency-dedup grouping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Self-check partitions and fall back to the unsplit groups on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,

    /// Groups smaller than this are recorded but get no container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_members: Option<usize>,
}

/// Artifact kind capabilities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct KindsConfig {
    /// Kinds that have a canonical serialized form
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub serialized: Vec<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(size_pack) = &self.size_pack {
            if size_pack.threshold_bytes == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "size_pack.threshold_bytes".to_string(),
                    reason: "threshold must be greater than zero".to_string(),
                });
            }
            validate_kind_names("size_pack.eligible_kinds", &size_pack.eligible_kinds)?;
        }

        if let Some(dedup) = &self.dedup {
            if dedup.min_members == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "dedup.min_members".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if let Some(kinds) = &self.kinds {
            validate_kind_names("kinds.serialized", &kinds.serialized)?;
        }

        Ok(())
    }

    /// Threshold set in this file, if any
    pub fn threshold_bytes(&self) -> Option<u64> {
        self.size_pack.as_ref().and_then(|s| s.threshold_bytes)
    }

    /// Output root set in this file, if any
    pub fn output_root(&self) -> Option<&Path> {
        self.output.as_ref().and_then(|o| o.root.as_deref())
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if other.output.is_some() {
            self.output = other.output.clone();
        }
        if other.size_pack.is_some() {
            self.size_pack = other.size_pack.clone();
        }
        if other.dedup.is_some() {
            self.dedup = other.dedup.clone();
        }
        if other.kinds.is_some() {
            self.kinds = other.kinds.clone();
        }
    }
}

fn validate_kind_names(field: &str, kinds: &[String]) -> ConfigResult<()> {
    if kinds.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "kind names cannot be empty".to_string(),
        });
    }
    Ok(())
}
