//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{DedupConfig, OutputConfig, ProjectConfig};
use crate::{
    ConfigError, ConfigResult, DEFAULT_OUTPUT_ROOT, DEFAULT_THRESHOLD_BYTES, PROJECT_CONFIG_FILE,
};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.shardpack/config.toml) - lowest priority
/// 2. Project config (./shardpack.toml) - overrides global
/// 3. Environment variables (SHARDPACK_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where shardpack.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.shardpack/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find shardpack.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        // A broken global config should not block a project build
        let global_config = self.load_global_config().unwrap_or_default();

        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config().unwrap_or_default();
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); no config found yields defaults
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.shardpack/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized: SHARDPACK_THRESHOLD_BYTES, SHARDPACK_OUTPUT, SHARDPACK_VERIFY
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(threshold) = env::var("SHARDPACK_THRESHOLD_BYTES") {
            let value = threshold
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| ConfigError::InvalidEnvOverride {
                    var: "SHARDPACK_THRESHOLD_BYTES".to_string(),
                    value: threshold.clone(),
                })?;
            config
                .size_pack
                .get_or_insert_with(Default::default)
                .threshold_bytes = Some(value);
        }

        if let Ok(output) = env::var("SHARDPACK_OUTPUT") {
            config
                .output
                .get_or_insert_with(OutputConfig::default)
                .root = Some(PathBuf::from(output));
        }

        if let Ok(verify) = env::var("SHARDPACK_VERIFY") {
            let verify_bool = matches!(verify.to_lowercase().as_str(), "true" | "1" | "yes");
            config.dedup.get_or_insert_with(DedupConfig::default).verify = Some(verify_bool);
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Effective pack threshold (project > global > default)
    pub fn threshold_bytes(&self) -> u64 {
        self.project
            .threshold_bytes()
            .or_else(|| self.global.default_threshold())
            .unwrap_or(DEFAULT_THRESHOLD_BYTES)
    }

    /// Effective output root; relative paths resolve against the project root
    pub fn output_root(&self) -> PathBuf {
        let root = self
            .project
            .output_root()
            .or_else(|| self.global.default_output_root())
            .unwrap_or(Path::new(DEFAULT_OUTPUT_ROOT));

        match &self.project_root {
            Some(project_root) if root.is_relative() => project_root.join(root),
            _ => root.to_path_buf(),
        }
    }

    /// Whether size-threshold packing is enabled (default: true)
    pub fn size_pack_enabled(&self) -> bool {
        self.project
            .size_pack
            .as_ref()
            .and_then(|s| s.enabled)
            .unwrap_or(true)
    }

    /// Kinds eligible for size-threshold packing
    pub fn eligible_kinds(&self) -> &[String] {
        self.project
            .size_pack
            .as_ref()
            .map(|s| s.eligible_kinds.as_slice())
            .unwrap_or(&[])
    }

    /// Kinds with a serialized form
    pub fn serialized_kinds(&self) -> &[String] {
        self.project
            .kinds
            .as_ref()
            .map(|k| k.serialized.as_slice())
            .unwrap_or(&[])
    }

    /// Whether dependency dedup is enabled (default: true)
    pub fn dedup_enabled(&self) -> bool {
        self.project
            .dedup
            .as_ref()
            .and_then(|d| d.enabled)
            .unwrap_or(true)
    }

    /// Whether partitions are self-checked (project > global > true)
    pub fn verify(&self) -> bool {
        self.project
            .dedup
            .as_ref()
            .and_then(|d| d.verify)
            .or_else(|| self.global.default_verify())
            .unwrap_or(true)
    }

    /// Minimum group size that gets a container (default: 2)
    pub fn min_members(&self) -> usize {
        self.project
            .dedup
            .as_ref()
            .and_then(|d| d.min_members)
            .unwrap_or(2)
    }

    /// Whether to write the bundle group manifest (default: true)
    pub fn write_manifest(&self) -> bool {
        self.project
            .output
            .as_ref()
            .and_then(|o| o.write_manifest)
            .unwrap_or(true)
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has shardpack.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
