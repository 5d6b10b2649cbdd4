//! Integration tests for the installation workflow
//!
//! Packages are unpacked into temporary directories; the in-memory host plays
//! both the object and the collection collaborator.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use scenegraft::host::memory::{HostEvent, MemoryHost, SwitchBehavior};
use scenegraft::{
    Diagnostic, EngineConfig, FixedIdentity, InstallReceipt, InstallRequest, InstallStage,
    Installer, Scope, SceneGraftError,
};

const PLACEHOLDER: &str = "Scene Import Successful - delete this Scene";

fn package(document: &Value) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("data.json"),
        serde_json::to_string(document).unwrap(),
    )
    .unwrap();
    dir
}

fn stream_package() -> Value {
    json!({
        "name": "Neon Stream",
        "current_scene": "Live",
        "sources": [
            {"id": "scene", "name": "Intro", "settings": {"items": [{"name": "Logo"}]}},
            {"id": "scene", "name": "Live", "settings": {"items": [
                {"name": "Cam", "locked": true},
                {"name": "Logo"}
            ]}},
            {"id": "video_capture", "name": "Cam", "filters": [{"id": "color_filter", "name": "Grade"}]},
            {"id": "image_source", "name": "Logo", "settings": {"file": "<REPLACE|ME>/logo.png"}},
            {"id": "browser_source", "name": "Chat", "settings": {"url": "https://chat.example/?u=<machine-token>"}}
        ],
        "groups": [],
        "transitions": [
            {"id": "fade_transition", "name": "Fade"}
        ]
    })
}

fn installer(host: &Arc<MemoryHost>, config: EngineConfig) -> Installer {
    Installer::new(
        host.clone(),
        host.clone(),
        Box::new(FixedIdentity::new("abc123")),
        config,
    )
}

fn install(
    host: &Arc<MemoryHost>,
    name: &str,
    dir: &TempDir,
) -> (Installer, Result<InstallReceipt, SceneGraftError>) {
    let mut installer = installer(host, EngineConfig::default());
    let result = installer.install(&InstallRequest {
        name: name.to_string(),
        package_dir: dir.path().to_path_buf(),
    });
    (installer, result)
}

// =============================================================================
// Success path
// =============================================================================

#[test]
fn test_install_commits_graph_into_new_collection() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&stream_package());

    let (installer, result) = install(&host, "Neon Stream", &dir);
    let receipt = result.unwrap();

    assert!(installer.context().is_committed());
    assert_eq!(receipt.collection_name, "Neon Stream");
    assert_eq!(receipt.backing_file, PathBuf::from("Neon_Stream.json"));
    assert_eq!(receipt.scenes, vec!["Intro", "Live"]);
    assert_eq!(receipt.current_scene.as_deref(), Some("Live"));
    // 6 entries + 1 filter
    assert_eq!(receipt.objects, 7);
    assert!(receipt.report.is_clean());

    assert_eq!(host.collections(), vec!["Neon Stream"]);
    assert_eq!(host.live_count(), 7);
    assert_eq!(host.save_count(), 1);
    assert_eq!(host.current_scene(), host.find_global("Live"));
}

#[test]
fn test_objects_are_global_and_tokens_resolved() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&stream_package());
    let (_, result) = install(&host, "Neon Stream", &dir);
    result.unwrap();

    let logo = host.object(host.find_global("Logo").unwrap()).unwrap();
    assert_eq!(logo.scope, Scope::Global);
    let expected = std::path::absolute(dir.path()).unwrap().join("logo.png");
    assert_eq!(logo.parameters["file"], json!(expected.to_string_lossy()));

    let chat = host.object(host.find_global("Chat").unwrap()).unwrap();
    assert_eq!(chat.parameters["url"], json!("https://chat.example/?u=abc123"));

    assert!(host.find_global("Fade").is_some());
}

#[test]
fn test_lock_state_restored_on_install() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&stream_package());
    let (_, result) = install(&host, "Neon Stream", &dir);
    result.unwrap();

    let live = host.object(host.find_global("Live").unwrap()).unwrap();
    let cam = host.item(live.items[0]).unwrap();
    let logo = host.item(live.items[1]).unwrap();
    assert!(cam.locked);
    assert!(!logo.locked);
}

#[test]
fn test_placeholder_scene_renamed_then_destroyed() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&stream_package());
    let (_, result) = install(&host, "Neon Stream", &dir);
    result.unwrap();

    let events = host.events();
    let renamed = events
        .iter()
        .find_map(|e| match e {
            HostEvent::Renamed { object, name } if name == PLACEHOLDER => Some(*object),
            _ => None,
        })
        .expect("default scene should be renamed");
    assert!(events.contains(&HostEvent::Destroyed { object: renamed }));
    assert!(host.object(renamed).is_none());
    assert!(host.find_global("Scene").is_none());
}

#[test]
fn test_current_scene_falls_back_to_last_scene() {
    let host = Arc::new(MemoryHost::new());
    let mut document = stream_package();
    document["current_scene"] = json!("Nowhere");
    let dir = package(&document);

    let (_, result) = install(&host, "Neon Stream", &dir);
    let receipt = result.unwrap();

    assert_eq!(receipt.current_scene.as_deref(), Some("Live"));
    assert_eq!(host.current_scene(), host.find_global("Live"));
}

#[test]
fn test_name_collisions_get_suffixes() {
    let host = Arc::new(
        MemoryHost::new().with_collections(["Main", "Main 2"], ["Main.json", "main_2.JSON"]),
    );
    let dir = package(&stream_package());

    let (_, result) = install(&host, "Main", &dir);
    let receipt = result.unwrap();

    assert_eq!(receipt.collection_name, "Main 3");
    assert_eq!(receipt.backing_file, PathBuf::from("Main_3.json"));
}

#[test]
fn test_second_install_uses_fresh_namespace() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&stream_package());

    let (_, first) = install(&host, "Neon Stream", &dir);
    first.unwrap();
    let (_, second) = install(&host, "Neon Stream", &dir);
    let receipt = second.unwrap();

    assert_eq!(receipt.collection_name, "Neon Stream 2");
    assert!(receipt.report.is_clean());
    assert_eq!(host.live_count(), 14);
}

#[test]
fn test_duplicate_global_name_is_skipped() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&json!({"sources": [
        {"id": "scene", "name": "Main", "settings": {"items": [{"name": "Cam"}]}},
        {"id": "video_capture", "name": "Cam"},
        {"id": "image_source", "name": "Cam"}
    ]}));

    let (_, result) = install(&host, "Dupes", &dir);
    let receipt = result.unwrap();

    assert!(receipt.report.diagnostics.contains(&Diagnostic::CreationFailed {
        name: "Cam".into(),
        type_id: "image_source".into(),
    }));
    let cam = host.object(host.find_global("Cam").unwrap()).unwrap();
    assert_eq!(cam.type_id, "video_capture");
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn test_missing_data_file_fails_before_switch() {
    let host = Arc::new(MemoryHost::new());
    let dir = TempDir::new().unwrap();

    let (installer, result) = install(&host, "Empty", &dir);
    let err = result.unwrap_err();

    assert!(err.to_string().contains("data.json missing"));
    assert_eq!(
        installer.context().failed_at(),
        Some(InstallStage::LoadingDescription)
    );
    assert!(host.collections().is_empty());
}

#[test]
fn test_refused_switch_builds_nothing() {
    let host = Arc::new(MemoryHost::new());
    host.set_switch_behavior(SwitchBehavior::Refuse("busy".to_string()));
    let dir = package(&stream_package());

    let (installer, result) = install(&host, "Neon Stream", &dir);
    let err = result.unwrap_err();

    assert!(err.to_string().contains("busy"));
    assert_eq!(
        installer.context().failed_at(),
        Some(InstallStage::SwitchingCollection)
    );
    assert!(!installer.context().is_switch_confirmed());
    assert_eq!(host.created_count(), 0);
}

#[test]
fn test_hangup_is_reported() {
    let host = Arc::new(MemoryHost::new());
    host.set_switch_behavior(SwitchBehavior::Hangup);
    let dir = package(&stream_package());

    let (installer, result) = install(&host, "Neon Stream", &dir);

    assert!(result.unwrap_err().to_string().contains("without confirming"));
    assert_eq!(
        installer.context().failed_at(),
        Some(InstallStage::SwitchingCollection)
    );
    assert_eq!(host.created_count(), 0);
}

#[test]
fn test_silent_host_times_out() {
    let host = Arc::new(MemoryHost::new());
    host.set_switch_behavior(SwitchBehavior::Silent);
    let dir = package(&stream_package());

    let mut config = EngineConfig::default();
    config.install.switch_timeout_ms = 50;
    let mut installer = installer(&host, config);
    let result = installer.install(&InstallRequest {
        name: "Neon Stream".to_string(),
        package_dir: dir.path().to_path_buf(),
    });

    assert!(result.unwrap_err().to_string().contains("timed out"));
    assert!(installer.context().is_failed());
    assert_eq!(host.created_count(), 0);
}

#[test]
fn test_failed_save_destroys_built_objects() {
    let host = Arc::new(MemoryHost::new());
    host.fail_saves();
    let dir = package(&stream_package());

    let (installer, result) = install(&host, "Neon Stream", &dir);

    assert!(matches!(result, Err(SceneGraftError::Host(_))));
    assert_eq!(installer.context().failed_at(), Some(InstallStage::Finalizing));
    assert_eq!(host.live_count(), 0);
}

#[test]
fn test_host_failure_mid_build_tears_down() {
    let host = Arc::new(MemoryHost::new());
    let dir = package(&stream_package());
    // default scene of the new collection plus three package objects
    host.fail_after(4);

    let (installer, result) = install(&host, "Neon Stream", &dir);

    assert!(matches!(result, Err(SceneGraftError::Host(_))));
    assert_eq!(installer.context().failed_at(), Some(InstallStage::BuildingGraph));
    // Only the renamed placeholder is left
    assert_eq!(host.live_count(), 1);
    assert!(host.find_global(PLACEHOLDER).is_some());
}
