//! Packing integration tests
//!
//! End-to-end tests from configuration to containers on disk

use pretty_assertions::assert_eq;
use rstest::rstest;
use shardpack_build::{
    decode, Artifact, ArtifactCatalog, BuildError, Bundle, ConfigLoader, ContainerView,
    GroupCoordinator, GroupKind, KindRegistry, PackOptions,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A small game-like project: two levels sharing textures and a material
struct Project {
    dir: TempDir,
    catalog: ArtifactCatalog,
}

impl Project {
    fn new() -> Self {
        let kinds = KindRegistry::new()
            .with_serialized(["mesh", "texture", "material"])
            .with_pack_eligible(["mesh"]);

        let mut project = Self {
            dir: TempDir::new().unwrap(),
            catalog: ArtifactCatalog::new(kinds),
        };

        project.add(
            Artifact::new("level1", "material").with_dependencies(["rock", "grass", "hero"]),
            b"L1",
        );
        project.add(
            Artifact::new("level2", "material").with_dependencies(["rock", "grass", "sky"]),
            b"L2",
        );
        project.add(Artifact::new("rock", "texture"), &[1u8; 7]);
        project.add(Artifact::new("grass", "texture"), &[2u8; 5]);
        project.add(Artifact::new("hero", "mesh"), b"hero-mesh");
        project.add(Artifact::new("sky", "mesh"), b"sky");
        project.add(Artifact::new("boulder", "mesh"), &[3u8; 300]);
        project
    }

    fn add(&mut self, artifact: Artifact, bytes: &[u8]) {
        let path = self.dir.path().join("library").join(format!("{}.asset", artifact.id));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        self.catalog.add_artifact(artifact.with_serialized_path(path));
    }

    fn read(&self, id: &str) -> Vec<u8> {
        fs::read(self.dir.path().join("library").join(format!("{}.asset", id))).unwrap()
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("packs")
    }

    fn coordinator(&self) -> GroupCoordinator {
        GroupCoordinator::new(PackOptions {
            output_root: self.out(),
            threshold_bytes: 100,
            ..PackOptions::default()
        })
    }
}

fn read_container(path: &Path) -> Vec<Vec<u8>> {
    decode(&fs::read(path).unwrap()).unwrap()
}

// ============================================================================
// End-to-end packing
// ============================================================================

#[test]
fn test_pack_bundle_end_to_end() {
    init_tracing();
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut bundle = Bundle::new("level1", ["level1", "hero", "boulder"]);
    let report = coordinator.pack_bundle(&project.catalog, &mut bundle).unwrap();

    // boulder is over the threshold, leaving hero as the only candidate
    let packed: Vec<_> = bundle.groups_of(GroupKind::SizeThresholdPack).collect();
    assert_eq!(packed.len(), 0, "a single small mesh is not worth packing");

    // hero's own closure splits it out of level1's
    let dedup: Vec<_> = bundle.groups_of(GroupKind::DependencyDedup).collect();
    let mut members: Vec<Vec<String>> = dedup.iter().map(|g| g.members.clone()).collect();
    members.sort();
    assert_eq!(
        members,
        vec![
            vec!["boulder".to_string()],
            vec!["grass".to_string(), "level1".to_string(), "rock".to_string()],
            vec!["hero".to_string()],
        ]
    );

    assert_eq!(report.containers_written.len(), 1);
    assert_eq!(report.stats.skipped_groups, 2);
}

#[test]
fn test_containers_hold_member_bytes_in_sorted_order() {
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut bundle = Bundle::new("meshes", ["sky", "hero", "boulder"]);
    coordinator.pack_bundle(&project.catalog, &mut bundle).unwrap();

    let group = bundle.groups_of(GroupKind::SizeThresholdPack).next().unwrap();
    assert_eq!(group.members, vec!["hero", "sky"]);

    let members = read_container(group.container.as_ref().unwrap());
    assert_eq!(members, vec![project.read("hero"), project.read("sky")]);
    assert_eq!(
        bundle.outputs_of("hero").unwrap().iter().collect::<Vec<_>>(),
        vec!["bin"]
    );
    assert!(bundle.outputs_of("boulder").is_none());
}

#[test]
fn test_container_view_reads_single_member() {
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut bundle = Bundle::new("meshes", ["sky", "hero"]);
    let report = coordinator.pack_bundle(&project.catalog, &mut bundle).unwrap();

    let bytes = fs::read(&report.containers_written[0]).unwrap();
    let view = ContainerView::parse(&bytes).unwrap();

    assert_eq!(view.len(), 2);
    assert_eq!(view.member(1).unwrap(), b"sky");
    for entry in view.entries() {
        assert_eq!(entry.offset % 4, 0);
    }
}

#[test]
fn test_shared_dependencies_are_split_out() {
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut bundle = Bundle::new("world", ["level1", "level2"]);
    coordinator.pack_bundle(&project.catalog, &mut bundle).unwrap();

    let index = bundle.group_index();
    let shared = index.position(GroupKind::DependencyDedup, "rock").unwrap();
    assert_eq!(index.position(GroupKind::DependencyDedup, "grass"), Some(shared));

    let group = &bundle.groups[shared];
    assert_eq!(group.members, vec!["grass", "rock"]);
    assert_eq!(
        read_container(group.container.as_ref().unwrap()),
        vec![project.read("grass"), project.read("rock")]
    );

    // Every id sits in exactly one dedup group
    let mut seen = HashSet::new();
    for group in bundle.groups_of(GroupKind::DependencyDedup) {
        for member in &group.members {
            assert!(seen.insert(member.clone()), "{} grouped twice", member);
        }
    }
}

#[test]
fn test_redirected_artifacts_stay_out() {
    let mut project = Project::new();
    project.add(Artifact::new("shared_sky", "mesh").redirected(), b"elsewhere");

    let mut bundle = Bundle::new("b", ["hero", "shared_sky"]);
    project
        .coordinator()
        .pack_bundle(&project.catalog, &mut bundle)
        .unwrap();

    assert!(!bundle.group_index().contains(GroupKind::SizeThresholdPack, "shared_sky"));
    assert!(!bundle.group_index().contains(GroupKind::DependencyDedup, "shared_sky"));
}

// ============================================================================
// Determinism and failure
// ============================================================================

#[test]
fn test_rebuild_is_byte_identical() {
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut first = Bundle::new("world", ["level1", "level2", "sky", "hero"]);
    let report = coordinator.pack_bundle(&project.catalog, &mut first).unwrap();
    let before: Vec<Vec<u8>> = report
        .containers_written
        .iter()
        .map(|p| fs::read(p).unwrap())
        .collect();

    coordinator.clean().unwrap();

    // Same artifacts in a different order
    let mut second = Bundle::new("world", ["hero", "sky", "level2", "level1"]);
    let again = coordinator.pack_bundle(&project.catalog, &mut second).unwrap();

    let mut paths_before = report.containers_written.clone();
    let mut paths_after = again.containers_written.clone();
    paths_before.sort();
    paths_after.sort();
    assert_eq!(paths_before, paths_after);

    for (path, bytes) in report.containers_written.iter().zip(before) {
        assert_eq!(fs::read(path).unwrap(), bytes);
    }
}

#[test]
fn test_unreadable_member_aborts_bundle_only() {
    let mut project = Project::new();
    let missing = project.dir.path().join("nope.asset");
    project
        .catalog
        .add_artifact(Artifact::new("ghost", "mesh").with_serialized_path(missing));
    let coordinator = project.coordinator();

    let mut bundles = vec![
        Bundle::new("good", ["hero", "sky"]),
        Bundle::new("bad", ["hero", "ghost"]),
    ];
    let results = coordinator.pack_bundles(&project.catalog, &mut bundles);

    assert!(results[0].is_ok());
    match &results[1] {
        Err(BuildError::PackFailed { bundle, .. }) => assert_eq!(bundle, "bad"),
        other => panic!("expected pack failure, got {:?}", other),
    }
    assert!(bundles[1].groups.is_empty());
}

#[test]
fn test_prune_keeps_referenced_containers() {
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut bundle = Bundle::new("meshes", ["sky", "hero"]);
    coordinator.pack_bundle(&project.catalog, &mut bundle).unwrap();

    // sky leaves the bundle, so the {hero, sky} container goes stale
    let mut changed = Bundle::new("meshes", ["hero", "boulder", "level1"]);
    coordinator.pack_bundle(&project.catalog, &mut changed).unwrap();

    let keep: HashSet<PathBuf> = changed
        .groups
        .iter()
        .filter_map(|g| g.container.clone())
        .collect();
    let removed = coordinator.prune_unreferenced("meshes", &keep).unwrap();

    assert_eq!(removed.len(), 1);
    assert_eq!(coordinator.existing_containers("meshes").unwrap().len(), keep.len());
}

#[test]
fn test_prune_leaves_other_bundles_alone() {
    let project = Project::new();
    let coordinator = project.coordinator();

    let mut bundles = vec![
        Bundle::new("one", ["hero", "sky"]),
        Bundle::new("two", ["level1", "level2"]),
        Bundle::new("three", ["sky", "hero"]),
    ];
    let reports: Vec<_> = coordinator
        .pack_bundles(&project.catalog, &mut bundles)
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // Identical groups in different bundles get separate files
    assert_eq!(bundles[0].groups[0].content_id, bundles[2].groups[0].content_id);
    assert_ne!(reports[0].containers_written, reports[2].containers_written);

    let keep: HashSet<PathBuf> = reports[1].containers_written.iter().cloned().collect();
    assert!(coordinator.prune_unreferenced("two", &keep).unwrap().is_empty());

    for report in [&reports[0], &reports[2]] {
        for path in &report.containers_written {
            assert!(path.exists(), "{} was pruned", path.display());
        }
    }

    // An empty keep set only clears the named bundle
    let removed = coordinator.prune_unreferenced("one", &HashSet::new()).unwrap();
    assert_eq!(removed, reports[0].containers_written);
    assert!(coordinator.existing_containers("one").unwrap().is_empty());
    assert_eq!(
        coordinator.existing_containers("three").unwrap(),
        reports[2].containers_written
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[rstest]
#[case("", 2, true)]
#[case("[dedup]\nmin_members = 1\n", 1, true)]
#[case("[dedup]\nmin_members = 3\nverify = false\n", 3, false)]
fn test_options_from_project_config(
    #[case] body: &str,
    #[case] min_members: usize,
    #[case] verify: bool,
) {
    let project = Project::new();
    let config_body = format!("[output]\nroot = \"out\"\n{}", body);
    fs::write(project.dir.path().join("shardpack.toml"), config_body).unwrap();

    let config = ConfigLoader::new()
        .with_global_config_path(project.dir.path().join("no-global.toml"))
        .load_from_directory(project.dir.path())
        .unwrap();
    let options = PackOptions::from_config(&config);

    assert_eq!(options.output_root, project.dir.path().join("out"));
    assert_eq!(options.min_members, min_members);
    assert_eq!(options.verify, verify);
}

#[test]
fn test_config_driven_pack() {
    let project = Project::new();
    fs::write(
        project.dir.path().join("shardpack.toml"),
        r#"
[output]
root = "packs"
write_manifest = true

[size_pack]
threshold_bytes = 1000
eligible_kinds = ["mesh"]

[dedup]
enabled = false

[kinds]
serialized = ["mesh", "texture", "material"]
"#,
    )
    .unwrap();

    let config = ConfigLoader::new()
        .with_global_config_path(project.dir.path().join("no-global.toml"))
        .load_from_directory(project.dir.path())
        .unwrap();

    // Registry from config agrees with the hand-built one
    assert_eq!(KindRegistry::from_config(&config), *project.catalog.kinds());

    let coordinator = GroupCoordinator::new(PackOptions::from_config(&config));
    let mut bundle = Bundle::new("all-meshes", ["hero", "sky", "boulder"]);
    let report = coordinator.pack_bundle(&project.catalog, &mut bundle).unwrap();

    assert_eq!(bundle.groups.len(), 1);
    assert_eq!(bundle.groups[0].members, vec!["boulder", "hero", "sky"]);

    let manifest = report.manifest.unwrap();
    assert_eq!(manifest, project.out().join("all-meshes.groups.json"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest).unwrap()).unwrap();
    assert_eq!(json["groups"][0]["content_id"], bundle.groups[0].content_id.as_str());
}

#[test]
fn test_invalid_project_config_is_reported() {
    let project = Project::new();
    fs::write(
        project.dir.path().join("shardpack.toml"),
        "[size_pack]\nthreshold_bytes = 0\n",
    )
    .unwrap();

    let result = GroupCoordinator::from_project_dir(project.dir.path());
    assert!(matches!(result, Err(BuildError::Config(_))));
}
