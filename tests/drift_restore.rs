//! Drift reporting and restore-script tests against a fake host install

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use fmj_provenance::config::ProvenanceConfig;
use fmj_provenance::embed::{embed, EmbedTarget};
use fmj_provenance::fingerprint::FingerprintCache;
use fmj_provenance::host::LocalHost;
use fmj_provenance::mock::{sample_runtime, StubOracle};
use fmj_provenance::nodes::LoadMetadata;
use fmj_provenance::reconcile::{reconcile, reconcile_symmetric, DiffStatus, HostStatus};
use fmj_provenance::restore::{synthesize, RestoreSettings};
use fmj_provenance::{GenerationRecord, VersionFingerprint};

fn fingerprint(host: &str, extensions: &[(&str, &str)]) -> VersionFingerprint {
    VersionFingerprint {
        host_app_version: host.to_string(),
        extensions: extensions
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect(),
        ..VersionFingerprint::default()
    }
}

/// Host at `host_version` with the manager extension at `manager_version`
fn make_install(root: &Path, host_version: &str, manager_version: &str) -> FingerprintCache {
    let manager = root.join("custom_nodes/ComfyUI-Manager");
    fs::create_dir_all(manager.join(".git")).unwrap();
    fs::create_dir_all(root.join("output")).unwrap();
    FingerprintCache::new(
        root.to_path_buf(),
        "custom_nodes",
        Box::new(
            StubOracle::new()
                .with_describe(root, host_version)
                .with_describe(&manager, manager_version),
        ),
        Box::new(sample_runtime()),
    )
}

#[test]
fn test_host_upgrade_produces_host_only_script() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let cache = make_install(root, "v1.1", "3.1.0");
    let host = LocalHost::new(root.to_path_buf(), root.join("output"), root.join("input"));

    // Saved under v1.0 with the same manager revision.
    let record = GenerationRecord::new(fingerprint("v1.0", &[("ComfyUI-Manager", "3.1.0")]))
        .with_prompt("an old render")
        .with_seed(99u64);
    embed(
        EmbedTarget::Sidecar {
            path: &root.join("output/old.json"),
        },
        &record,
    )
    .unwrap();

    let node = LoadMetadata::new(&host, &cache, &ProvenanceConfig::default()).unwrap();
    let load = node.load_metadata("old.json").unwrap();

    assert_eq!(load.prompt_text, "an old render");
    assert!(load.version_report.contains("Seed:\n   99"));
    assert!(load.version_report.contains("[!!] ComfyUI version changed: v1.0 -> v1.1"));
    assert!(load.version_report.contains("   [OK] ComfyUI-Manager: 3.1.0"));

    let script = &load.restore_script;
    assert!(script.contains("git checkout v1.0"));
    assert!(script.contains(&format!("cd \"{}\"", root.display())));
    assert!(!script.contains("custom_nodes/ComfyUI-Manager\""));
    assert!(!script.contains("restore-snapshot"));
}

#[test]
fn test_manager_downgrade_and_snapshot() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let cache = make_install(root, "v1.0", "3.2.0");
    let host = LocalHost::new(root.to_path_buf(), root.join("output"), root.join("input"));

    let record = GenerationRecord::new(fingerprint("v1.0", &[("ComfyUI-Manager", "3.1.0")]))
        .with_snapshot_reference(Some("img_00001_.snapshot.json".to_string()));
    embed(
        EmbedTarget::Sidecar {
            path: &root.join("output/img_00001_.json"),
        },
        &record,
    )
    .unwrap();

    let node = LoadMetadata::new(&host, &cache, &ProvenanceConfig::default()).unwrap();
    let load = node.load_metadata("img_00001_.json").unwrap();

    assert!(load.version_report.contains("[OK] ComfyUI version matches: v1.0"));
    assert!(load
        .version_report
        .contains("   [!!] ComfyUI-Manager: 3.1.0 -> 3.2.0 (CHANGED)"));
    assert!(load.version_report.contains("Snapshot: img_00001_.snapshot.json"));

    let script = &load.restore_script;
    assert!(!script.contains("git checkout v1.0"));
    assert!(script.contains("git checkout 3.1.0"));
    assert!(script.contains("restore-snapshot img_00001_.snapshot.json"));
}

#[test]
fn test_identical_fingerprints_need_no_restore() {
    let fp = fingerprint("v1.0", &[("ComfyUI-Manager", "3.1.0"), ("rgthree-comfy", "1.2")]);
    let result = reconcile(&fp, &fp, "ComfyUI-Manager");

    assert!(result.is_clean());
    assert_eq!(result.host.status, HostStatus::Match);
    assert_eq!(result.count(DiffStatus::Match), 2);
    assert_eq!(
        synthesize(&fp, &fp, None, Path::new("/srv/comfy"), &RestoreSettings::default()),
        None
    );
}

#[test]
fn test_renamed_extension_directory_still_matches() {
    let saved = fingerprint("v1", &[("ComfyUI_Impact_Pack", "4.0")]);
    let current = fingerprint("v1", &[("comfyui-impact-pack", "4.0")]);
    let result = reconcile(&saved, &current, "ComfyUI-Manager");

    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].status, DiffStatus::Match);
}

#[test]
fn test_removed_and_added_extensions() {
    let saved = fingerprint("v1", &[("old-nodes", "1.0")]);
    let current = fingerprint("v1", &[("new-nodes", "2.0")]);

    let one_way = reconcile(&saved, &current, "ComfyUI-Manager");
    assert_eq!(one_way.count(DiffStatus::MissingNow), 1);
    assert_eq!(one_way.count(DiffStatus::NewlyInstalled), 0);

    let both_ways = reconcile_symmetric(&saved, &current, "ComfyUI-Manager");
    assert_eq!(both_ways.count(DiffStatus::MissingNow), 1);
    assert_eq!(both_ways.count(DiffStatus::NewlyInstalled), 1);
}

#[test]
fn test_hostile_descriptor_is_quoted() {
    let saved = fingerprint("v1.0; rm -rf ~", &[]);
    let current = fingerprint("v1.1", &[]);
    let script = synthesize(
        &saved,
        &current,
        Some("$(curl evil).json"),
        Path::new("/srv/comfy"),
        &RestoreSettings::default(),
    )
    .unwrap();

    assert!(script.contains("git checkout 'v1.0; rm -rf ~'"));
    assert!(script.contains("restore-snapshot '$(curl evil).json'"));
}
