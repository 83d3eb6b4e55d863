//! Bundle packing orchestration
//!
//! [`GroupCoordinator`] turns one bundle's artifacts into groups, writes a
//! container per group, and records the result back on the [`Bundle`].
use crate::artifact::ArtifactSource;
use crate::container;
use crate::error::{BuildError, BuildResult};
use crate::group::{Group, GroupIndex, GroupKind, CONTAINER_EXTENSION};
use crate::partition::split_partition;
use crate::select::select_for_packing;
use crate::walker::DependencyWalker;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shardpack_config::{Config, ConfigLoader, DEFAULT_OUTPUT_ROOT, DEFAULT_THRESHOLD_BYTES};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Suffix of the per-bundle group manifest
pub const MANIFEST_SUFFIX: &str = "groups.json";

/// Packing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Directory containers are written under
    pub output_root: PathBuf,
    /// Run size-threshold packing
    pub size_pack: bool,
    /// Largest serialized size that may be packed
    pub threshold_bytes: u64,
    /// Run dependency dedup grouping
    pub dedup: bool,
    /// Self-check partitions and fall back on failure
    pub verify: bool,
    /// Smallest dedup group that gets a container
    pub min_members: usize,
    /// Write `<bundle>.groups.json` next to the containers
    pub write_manifest: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            size_pack: true,
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            dedup: true,
            verify: true,
            min_members: 2,
            write_manifest: true,
        }
    }
}

impl PackOptions {
    /// Options resolved from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_root: config.output_root(),
            size_pack: config.size_pack_enabled(),
            threshold_bytes: config.threshold_bytes(),
            dedup: config.dedup_enabled(),
            verify: config.verify(),
            min_members: config.min_members(),
            write_manifest: config.write_manifest(),
        }
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.threshold_bytes == 0 {
            return Err(BuildError::InvalidOptions(
                "threshold_bytes must be greater than zero".to_string(),
            ));
        }
        if self.min_members == 0 {
            return Err(BuildError::InvalidOptions(
                "min_members must be at least 1".to_string(),
            ));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(BuildError::InvalidOptions(
                "output_root must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A deployable unit of artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle name, also used for the manifest file name
    pub name: String,
    /// Ids of the artifacts this bundle owns
    pub artifacts: Vec<String>,
    /// Groups from the last pack run
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Output extensions produced per packed artifact
    #[serde(default)]
    pub outputs: BTreeMap<String, BTreeSet<String>>,
}

impl Bundle {
    /// Create a bundle owning `artifacts`
    pub fn new<I, S>(name: impl Into<String>, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            artifacts: artifacts.into_iter().map(Into::into).collect(),
            groups: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Groups of one kind, in creation order
    pub fn groups_of(&self, kind: GroupKind) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(move |g| g.kind == kind)
    }

    /// Reverse index over the current groups
    pub fn group_index(&self) -> GroupIndex {
        GroupIndex::build(&self.groups)
    }

    /// Output extensions recorded for `id`
    pub fn outputs_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.outputs.get(id)
    }
}

/// Timings and counters for one pack run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackStats {
    /// Artifacts selected for size-threshold packing
    pub pack_candidates: usize,
    /// Non-empty dependency closures fed to the partitioner
    pub closures: usize,
    /// Groups recorded on the bundle
    pub groups: usize,
    /// Groups too small to get a container
    pub skipped_groups: usize,
    pub select_time: Duration,
    pub walk_time: Duration,
    pub partition_time: Duration,
    pub write_time: Duration,
    pub total_time: Duration,
}

/// Result of packing one bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackReport {
    /// Bundle name
    pub bundle: String,
    /// Groups recorded on the bundle
    pub groups: Vec<Group>,
    /// Container files written
    pub containers_written: Vec<PathBuf>,
    /// Total container bytes written
    pub bytes_written: u64,
    /// Manifest written, if enabled
    pub manifest: Option<PathBuf>,
    pub stats: PackStats,
}

#[derive(Serialize)]
struct ManifestRecord<'a> {
    bundle: &'a str,
    groups: &'a [Group],
    outputs: &'a BTreeMap<String, BTreeSet<String>>,
}

/// Builds groups for bundles and writes their containers
#[derive(Debug, Clone, Default)]
pub struct GroupCoordinator {
    options: PackOptions,
}

impl GroupCoordinator {
    /// Create a coordinator with the given options
    pub fn new(options: PackOptions) -> Self {
        Self { options }
    }

    /// Load `shardpack.toml` from `project_dir` or a parent and build a
    /// coordinator from it
    pub fn from_project_dir(project_dir: &Path) -> BuildResult<Self> {
        let config = ConfigLoader::new().load_from_directory(project_dir)?;
        let options = PackOptions::from_config(&config);
        options.validate()?;
        Ok(Self::new(options))
    }

    /// Set the output root
    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.options.output_root = output_root.into();
        self
    }

    /// Set the size-threshold
    pub fn with_threshold(mut self, threshold_bytes: u64) -> Self {
        self.options.threshold_bytes = threshold_bytes;
        self
    }

    /// Enable/disable the partition self-check
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.options.verify = verify;
        self
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Directory holding `bundle`'s containers
    pub fn bundle_root(&self, bundle: &str) -> PathBuf {
        self.options.output_root.join(bundle)
    }

    /// Path of the group manifest for `bundle`
    pub fn manifest_path(&self, bundle: &str) -> PathBuf {
        self.options
            .output_root
            .join(format!("{}.{}", bundle, MANIFEST_SUFFIX))
    }

    /// Compute the groups for `bundle` without touching the filesystem
    /// beyond size probes
    pub fn plan_groups<S>(&self, source: &S, bundle: &Bundle) -> BuildResult<Vec<Group>>
    where
        S: ArtifactSource + ?Sized,
    {
        self.plan(source, bundle, &mut PackStats::default())
    }

    fn plan<S>(
        &self,
        source: &S,
        bundle: &Bundle,
        stats: &mut PackStats,
    ) -> BuildResult<Vec<Group>>
    where
        S: ArtifactSource + ?Sized,
    {
        let mut groups = Vec::new();

        if self.options.size_pack {
            let select_start = Instant::now();
            let selection = select_for_packing(
                source,
                &bundle.artifacts,
                |kind| source.is_pack_eligible(kind),
                self.options.threshold_bytes,
            )?;
            stats.pack_candidates = selection.len();
            stats.select_time = select_start.elapsed();

            if selection.is_actionable() {
                groups.push(Group::new(GroupKind::SizeThresholdPack, selection.ids));
            } else {
                debug!(
                    bundle = %bundle.name,
                    candidates = selection.ids.len(),
                    "not enough small artifacts to pack"
                );
            }
        }

        if self.options.dedup {
            let walk_start = Instant::now();
            let roots = bundle
                .artifacts
                .iter()
                .filter(|id| !source.is_redirected(id));
            let closures = DependencyWalker::new(source).closures(roots);
            stats.closures = closures.iter().filter(|c| !c.is_empty()).count();
            stats.walk_time = walk_start.elapsed();

            let partition_start = Instant::now();
            let split = split_partition(&closures, self.options.verify);
            stats.partition_time = partition_start.elapsed();

            groups.extend(
                split
                    .into_iter()
                    .filter(|members| !members.is_empty())
                    .map(|members| Group::new(GroupKind::DependencyDedup, members)),
            );
        }

        stats.groups = groups.len();
        Ok(groups)
    }

    /// Pack one bundle.
    ///
    /// Replaces the bundle's groups and outputs. Any member that cannot be
    /// read aborts this bundle with [`BuildError::PackFailed`]; containers
    /// already written stay in place and are overwritten by the next run.
    pub fn pack_bundle<S>(&self, source: &S, bundle: &mut Bundle) -> BuildResult<PackReport>
    where
        S: ArtifactSource + ?Sized,
    {
        let pack_start = Instant::now();
        self.options
            .validate()
            .and_then(|()| validate_bundle_name(&bundle.name))
            .map_err(|e| BuildError::pack_failed(&bundle.name, e))?;

        info!(bundle = %bundle.name, artifacts = bundle.artifacts.len(), "packing bundle");

        let bundle_root = self.bundle_root(&bundle.name);
        let mut stats = PackStats::default();
        let mut groups = self
            .plan(source, bundle, &mut stats)
            .map_err(|e| BuildError::pack_failed(&bundle.name, e))?;

        let write_start = Instant::now();
        let mut outputs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut containers_written = Vec::new();
        let mut bytes_written = 0;

        for group in &mut groups {
            if !self.should_write(group) {
                debug!(
                    bundle = %bundle.name,
                    group = %group.content_id,
                    members = group.len(),
                    "group below min_members, no container"
                );
                stats.skipped_groups += 1;
                continue;
            }

            let (path, len) = self
                .write_group(source, group, &bundle_root)
                .map_err(|e| BuildError::pack_failed(&bundle.name, e))?;

            for member in &group.members {
                outputs
                    .entry(member.clone())
                    .or_default()
                    .insert(CONTAINER_EXTENSION.to_string());
            }
            group.container = Some(path.clone());
            containers_written.push(path);
            bytes_written += len;
        }
        stats.write_time = write_start.elapsed();

        bundle.groups = groups;
        bundle.outputs = outputs;

        let manifest = if self.options.write_manifest {
            let path = self
                .write_manifest(bundle)
                .map_err(|e| BuildError::pack_failed(&bundle.name, e))?;
            Some(path)
        } else {
            None
        };

        stats.total_time = pack_start.elapsed();

        info!(
            bundle = %bundle.name,
            groups = stats.groups,
            containers = containers_written.len(),
            bytes = bytes_written,
            elapsed_ms = stats.total_time.as_millis() as u64,
            "bundle packed"
        );

        Ok(PackReport {
            bundle: bundle.name.clone(),
            groups: bundle.groups.clone(),
            containers_written,
            bytes_written,
            manifest,
            stats,
        })
    }

    /// Pack several independent bundles in parallel.
    ///
    /// Results are in `bundles` order; one failed bundle does not stop the
    /// others.
    pub fn pack_bundles<S>(
        &self,
        source: &S,
        bundles: &mut [Bundle],
    ) -> Vec<BuildResult<PackReport>>
    where
        S: ArtifactSource + ?Sized,
    {
        bundles
            .par_iter_mut()
            .map(|bundle| self.pack_bundle(source, bundle))
            .collect()
    }

    fn should_write(&self, group: &Group) -> bool {
        match group.kind {
            GroupKind::SizeThresholdPack => group.len() >= 2,
            GroupKind::DependencyDedup => group.len() >= self.options.min_members,
        }
    }

    /// Read members in sorted order, encode, and write the container
    fn write_group<S>(
        &self,
        source: &S,
        group: &Group,
        bundle_root: &Path,
    ) -> BuildResult<(PathBuf, u64)>
    where
        S: ArtifactSource + ?Sized,
    {
        // Members are already sorted; collect keeps that order
        let buffers = group
            .members
            .par_iter()
            .map(|id| source.read_serialized(id))
            .collect::<BuildResult<Vec<_>>>()?;

        let bytes = container::encode(&buffers)?;
        let path = group.container_path(bundle_root);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(&path, &bytes).map_err(|e| BuildError::io(&path, e))?;

        debug!(
            kind = %group.kind,
            group = %group.content_id,
            members = group.len(),
            bytes = bytes.len(),
            "container written"
        );

        Ok((path, bytes.len() as u64))
    }

    fn write_manifest(&self, bundle: &Bundle) -> BuildResult<PathBuf> {
        let path = self.manifest_path(&bundle.name);
        let record = ManifestRecord {
            bundle: &bundle.name,
            groups: &bundle.groups,
            outputs: &bundle.outputs,
        };
        let json = serde_json::to_string_pretty(&record)?;

        fs::create_dir_all(&self.options.output_root)
            .map_err(|e| BuildError::io(&self.options.output_root, e))?;
        fs::write(&path, json).map_err(|e| BuildError::io(&path, e))?;

        Ok(path)
    }

    /// Container files under `bundle`'s root, sorted
    pub fn existing_containers(&self, bundle: &str) -> BuildResult<Vec<PathBuf>> {
        validate_bundle_name(bundle)?;
        let root = &self.bundle_root(bundle);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut containers = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                BuildError::io(path, e.into())
            })?;
            if entry.file_type().is_file() && is_container(entry.path()) {
                containers.push(entry.path().to_path_buf());
            }
        }

        containers.sort();
        Ok(containers)
    }

    /// Delete `bundle`'s containers not in `keep`; returns the removed paths.
    ///
    /// Other bundles' containers are never touched.
    pub fn prune_unreferenced(
        &self,
        bundle: &str,
        keep: &HashSet<PathBuf>,
    ) -> BuildResult<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in self.existing_containers(bundle)? {
            if keep.contains(&path) {
                continue;
            }
            fs::remove_file(&path).map_err(|e| BuildError::io(&path, e))?;
            debug!(bundle, path = %path.display(), "pruned stale container");
            removed.push(path);
        }
        Ok(removed)
    }

    /// Remove the whole output root
    pub fn clean(&self) -> BuildResult<()> {
        let root = &self.options.output_root;
        if root.exists() {
            fs::remove_dir_all(root).map_err(|e| BuildError::io(root, e))?;
            info!(path = %root.display(), "output root removed");
        }
        Ok(())
    }
}

/// Bundle names become directory names under the output root
fn validate_bundle_name(name: &str) -> BuildResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\']);

    if valid {
        Ok(())
    } else {
        Err(BuildError::InvalidOptions(format!(
            "bundle name '{}' cannot be used as a directory name",
            name
        )))
    }
}

fn is_container(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(CONTAINER_EXTENSION)
}
