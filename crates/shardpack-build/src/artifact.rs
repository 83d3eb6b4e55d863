//! Artifact records and the metadata source the packer reads from
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

/// One build output unit derived from an imported resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Opaque artifact id
    pub id: String,
    /// Kind tag (e.g. "mesh", "texture")
    pub kind: String,
    /// Byte size of the canonical serialized form
    pub size: u64,
    /// Direct dependency ids, in declaration order
    pub dependencies: Vec<String>,
    /// Sourced from another bundle; never duplicated locally
    pub redirect: bool,
    /// Where the serialized form lives on disk
    pub serialized_path: Option<PathBuf>,
}

impl Artifact {
    /// Create a new artifact
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            size: 0,
            dependencies: Vec::new(),
            redirect: false,
            serialized_path: None,
        }
    }

    /// Set direct dependencies
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the recorded serialized size
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the serialized form's path
    pub fn with_serialized_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.serialized_path = Some(path.into());
        self
    }

    /// Mark as supplied by another bundle
    pub fn redirected(mut self) -> Self {
        self.redirect = true;
        self
    }
}

/// Capability predicates over kind tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindRegistry {
    serialized: BTreeSet<String>,
    pack_eligible: BTreeSet<String>,
}

impl KindRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds that have a serialized form
    pub fn with_serialized<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.serialized.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Kinds eligible for size-threshold packing
    pub fn with_pack_eligible<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pack_eligible.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Build a registry from loaded configuration
    pub fn from_config(config: &shardpack_config::Config) -> Self {
        Self::new()
            .with_serialized(config.serialized_kinds().iter().cloned())
            .with_pack_eligible(config.eligible_kinds().iter().cloned())
    }

    pub fn has_serialized_form(&self, kind: &str) -> bool {
        self.serialized.contains(kind)
    }

    pub fn is_pack_eligible(&self, kind: &str) -> bool {
        self.pack_eligible.contains(kind)
    }
}

/// Read-only view of artifact metadata.
///
/// The walker, selector, and coordinator only reach artifacts through this
/// trait, so any asset database can feed them.
pub trait ArtifactSource: Sync {
    /// Look up an artifact by id
    fn artifact(&self, id: &str) -> Option<&Artifact>;

    /// Whether the artifact's kind has a serialized form
    fn kind_has_serialized_form(&self, kind: &str) -> bool;

    /// Whether the kind may be size-threshold packed
    fn is_pack_eligible(&self, kind: &str) -> bool;

    /// Whether the artifact takes part in grouping: serialized and local
    fn has_serialized_form(&self, artifact: &Artifact) -> bool {
        !artifact.redirect && self.kind_has_serialized_form(&artifact.kind)
    }

    /// Whether `id` is supplied by another bundle
    fn is_redirected(&self, id: &str) -> bool {
        self.artifact(id).is_some_and(|a| a.redirect)
    }

    /// On-disk size of the serialized form, or the recorded size when no
    /// file is attached
    fn serialized_size(&self, id: &str) -> BuildResult<u64> {
        let artifact = self
            .artifact(id)
            .ok_or_else(|| BuildError::artifact_not_found(id))?;

        match &artifact.serialized_path {
            Some(path) => fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| BuildError::io(path, e)),
            None => Ok(artifact.size),
        }
    }

    /// Read the serialized bytes
    fn read_serialized(&self, id: &str) -> BuildResult<Vec<u8>> {
        let artifact = self
            .artifact(id)
            .ok_or_else(|| BuildError::artifact_not_found(id))?;
        let path = artifact
            .serialized_path
            .as_ref()
            .ok_or_else(|| BuildError::missing_serialized_form(id))?;

        fs::read(path).map_err(|e| BuildError::io(path, e))
    }
}

/// In-memory artifact store
#[derive(Debug, Clone, Default)]
pub struct ArtifactCatalog {
    artifacts: HashMap<String, Artifact>,
    kinds: KindRegistry,
}

impl ArtifactCatalog {
    /// Create an empty catalog using `kinds` for capability checks
    pub fn new(kinds: KindRegistry) -> Self {
        Self {
            artifacts: HashMap::new(),
            kinds,
        }
    }

    /// Add (or replace) an artifact
    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.id.clone(), artifact);
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// All ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.artifacts.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Check every dependency id resolves.
    ///
    /// Walking tolerates dangling ids; this is for callers that want to
    /// surface them before a build.
    pub fn validate(&self) -> BuildResult<()> {
        for id in self.ids() {
            let artifact = &self.artifacts[&id];
            for dep in &artifact.dependencies {
                if !self.artifacts.contains_key(dep) {
                    return Err(BuildError::ArtifactNotFound {
                        id: format!("{} (required by {})", dep, id),
                    });
                }
            }
        }
        Ok(())
    }
}

impl ArtifactSource for ArtifactCatalog {
    fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    fn kind_has_serialized_form(&self, kind: &str) -> bool {
        self.kinds.has_serialized_form(kind)
    }

    fn is_pack_eligible(&self, kind: &str) -> bool {
        self.kinds.is_pack_eligible(kind)
    }
}
