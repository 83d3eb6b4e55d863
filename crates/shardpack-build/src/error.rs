/// Pack pipeline error types
use crate::container::FormatError;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Artifact not found: {id}")]
    ArtifactNotFound { id: String },

    #[error("Artifact '{id}' has no readable serialized form")]
    MissingSerializedForm { id: String },

    #[error("Container format error: {0}")]
    Format(#[from] FormatError),

    #[error("Invalid pack options: {0}")]
    InvalidOptions(String),

    #[error("Configuration error: {0}")]
    Config(#[from] shardpack_config::ConfigError),

    #[error("Failed to write bundle manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packing failed for bundle '{bundle}': {source}")]
    PackFailed {
        bundle: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create an artifact not found error
    pub fn artifact_not_found(id: impl Into<String>) -> Self {
        Self::ArtifactNotFound { id: id.into() }
    }

    /// Create a missing serialized form error
    pub fn missing_serialized_form(id: impl Into<String>) -> Self {
        Self::MissingSerializedForm { id: id.into() }
    }

    /// Wrap an error as a failure of one bundle's pack step
    pub fn pack_failed(bundle: impl Into<String>, source: BuildError) -> Self {
        Self::PackFailed {
            bundle: bundle.into(),
            source: Box::new(source),
        }
    }
}
