//! Shardpack Configuration System
//!
//! Provides configuration management for packing builds including:
//! - Project configuration (shardpack.toml)
//! - Global user configuration (~/.shardpack/config.toml)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.shardpack/config.toml)
//! 3. Project config (./shardpack.toml)
//! 4. Environment variables (SHARDPACK_*)
//!
//! # Example
//!
//! ```no_run
//! use shardpack_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("threshold: {} bytes", config.threshold_bytes());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid environment override {var}={value}")]
    InvalidEnvOverride { var: String, value: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the project configuration file
pub const PROJECT_CONFIG_FILE: &str = "shardpack.toml";

/// Default size threshold for pack candidates (64 KiB)
pub const DEFAULT_THRESHOLD_BYTES: u64 = 64 * 1024;

/// Default container output root, relative to the project root
pub const DEFAULT_OUTPUT_ROOT: &str = "build/packs";

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::ProjectConfig;
