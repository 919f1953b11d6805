//! Registry construction against a real directory of artifact files,
//! including the partial-load behavior when some files are broken.

use std::path::Path;

use augur_core::{ExecutionMode, ModelId, ModelRegistry};

fn write_artifact(dir: &Path, file: &str, model_id: &str, mode: &str) {
    let doc = serde_json::json!({
        "model_id": model_id,
        "name": format!("Model {model_id}"),
        "description": "integration fixture",
        "version": "1.0.0",
        "created_at": "2025-11-03T10:00:00Z",
        "type": mode,
        "feature_names": ["f1", "f2"],
        "lower_bounds": [0.0, 0.0],
        "upper_bounds": [10.0, 10.0],
        "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
        "predictor": {"kind": "linear", "intercept": 0.0, "coefficients": [1.0, 1.0]}
    });
    std::fs::write(dir.join(file), serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}

#[test]
fn builds_registry_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "m1.json", "m1", "sync");
    write_artifact(dir.path(), "m2.json", "m2", "async");

    let registry = ModelRegistry::build(dir.path());
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.descriptor(&ModelId::from("m1")).unwrap().execution_mode,
        ExecutionMode::Sync
    );
    assert_eq!(
        registry.descriptor(&ModelId::from("m2")).unwrap().execution_mode,
        ExecutionMode::Async
    );
}

#[test]
fn broken_artifacts_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "good.json", "good", "sync");
    std::fs::write(dir.path().join("broken.json"), "{ definitely not json").unwrap();
    // Parses but fails validation: bounds length does not match features.
    let invalid = serde_json::json!({
        "model_id": "invalid",
        "name": "Invalid",
        "version": "1.0.0",
        "created_at": "2025-11-03T10:00:00Z",
        "type": "sync",
        "feature_names": ["f1", "f2"],
        "lower_bounds": [0.0],
        "upper_bounds": [10.0],
        "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
        "predictor": {"kind": "linear", "intercept": 0.0, "coefficients": [1.0, 1.0]}
    });
    std::fs::write(
        dir.path().join("invalid.json"),
        serde_json::to_vec(&invalid).unwrap(),
    )
    .unwrap();
    // Non-JSON extensions are ignored entirely.
    std::fs::write(dir.path().join("notes.txt"), "not an artifact").unwrap();

    let registry = ModelRegistry::build(dir.path());
    assert_eq!(registry.len(), 1);
    assert!(registry.lookup(&ModelId::from("good")).is_some());
    assert!(registry.lookup(&ModelId::from("invalid")).is_none());
}

#[test]
fn missing_directory_yields_empty_registry() {
    let registry = ModelRegistry::build(Path::new("/definitely/not/a/real/dir"));
    assert!(registry.is_empty());
}

#[test]
fn duplicate_ids_keep_first_artifact_in_path_order() {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "a_first.json", "dup", "sync");
    write_artifact(dir.path(), "b_second.json", "dup", "async");

    let registry = ModelRegistry::build(dir.path());
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.descriptor(&ModelId::from("dup")).unwrap().execution_mode,
        ExecutionMode::Sync
    );
}
