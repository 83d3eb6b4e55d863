//! Shardpack artifact grouping and container packing
//!
//! Groups a bundle's build artifacts and packs each group into one binary
//! container:
//! - Size-threshold packing of small artifacts
//! - Dependency closures and disjoint dedup partitions
//! - Aligned binary container format (encode, decode, zero-copy view)
//! - Parallel member reads and bundle processing
//! - Optional per-bundle group manifest

pub mod artifact;
pub mod container;
pub mod coordinator;
pub mod error;
pub mod group;
pub mod partition;
pub mod select;
pub mod walker;

// Re-export main types
pub use artifact::{Artifact, ArtifactCatalog, ArtifactSource, KindRegistry};
pub use container::{decode, encode, ContainerEntry, ContainerView, FormatError};
pub use coordinator::{Bundle, GroupCoordinator, PackOptions, PackReport, PackStats};
pub use error::{BuildError, BuildResult};
pub use group::{content_id, Group, GroupIndex, GroupKind};
pub use partition::{is_disjoint_cover, split_partition, Overlap};
pub use select::{select_for_packing, Selection};
pub use walker::DependencyWalker;

// Re-export shardpack-config types for convenience
pub use shardpack_config::{Config, ConfigLoader};
