/// Group records attached to a bundle
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File extension of written containers
pub const CONTAINER_EXTENSION: &str = "bin";

/// Why a set of artifacts was grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    /// Small artifacts merged to amortize per-file overhead
    SizeThresholdPack,
    /// Shared dependencies split out so no bundle chunk duplicates them
    DependencyDedup,
}

impl GroupKind {
    /// Stable tag used in manifests
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SizeThresholdPack => "size-threshold-pack",
            Self::DependencyDedup => "dependency-dedup",
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A disjoint set of artifact ids slated for combined packaging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group type
    pub kind: GroupKind,
    /// Member ids, sorted and unique
    pub members: Vec<String>,
    /// Content identity derived from the sorted member ids
    pub content_id: String,
    /// Container written for this group, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<PathBuf>,
}

impl Group {
    /// Create a group; member order and duplicates do not matter
    pub fn new<I, S>(kind: GroupKind, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: Vec<String> = members.into_iter().map(Into::into).collect();
        members.sort();
        members.dedup();
        let content_id = content_id(&members);

        Self {
            kind,
            members,
            content_id,
            container: None,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(id)).is_ok()
    }

    /// Where this group's container lives under `bundle_root`.
    ///
    /// The first two id characters select a shard directory. Ids too short
    /// to split (only possible for hand-edited records) use `_`.
    pub fn container_path(&self, bundle_root: &Path) -> PathBuf {
        let shard = self.content_id.get(..2).unwrap_or("_");
        bundle_root
            .join(shard)
            .join(format!("{}.{}", self.content_id, CONTAINER_EXTENSION))
    }
}

/// SHA-256 over sorted ids, each terminated by a newline, as lowercase hex
pub fn content_id(sorted_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    for id in sorted_ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Reverse lookup from artifact id to its group, per group kind
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    positions: HashMap<(GroupKind, String), usize>,
}

impl GroupIndex {
    /// Index `groups`; positions refer to the slice order
    pub fn build(groups: &[Group]) -> Self {
        let mut positions = HashMap::new();
        for (position, group) in groups.iter().enumerate() {
            for member in &group.members {
                positions.insert((group.kind, member.clone()), position);
            }
        }
        Self { positions }
    }

    /// Position of the group of `kind` holding `id`
    pub fn position(&self, kind: GroupKind, id: &str) -> Option<usize> {
        self.positions.get(&(kind, id.to_string())).copied()
    }

    pub fn contains(&self, kind: GroupKind, id: &str) -> bool {
        self.position(kind, id).is_some()
    }
}
