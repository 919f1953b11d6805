//! Augur CLI library - testable functions and modules
//!
//! This library provides the core functionality for the augur CLI:
//! configuration loading plus the artifact validation behind `augur check`.

pub mod config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use augur_core::ArtifactBundle;

/// Load and validate every `*.json` artifact under `model_dir`.
///
/// Returns one report line per valid artifact and one `path: error` line
/// per broken one, in sorted path order so output is stable across runs.
pub fn check_artifacts(model_dir: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let entries = std::fs::read_dir(model_dir)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", model_dir.display(), e))?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut valid = Vec::new();
    let mut broken = Vec::new();
    for path in paths {
        match ArtifactBundle::load(&path) {
            Ok(bundle) => valid.push(format!(
                "{} v{} ({}, {} features)",
                bundle.model_id(),
                bundle.descriptor.version,
                bundle.execution_mode(),
                bundle.feature_names.len()
            )),
            Err(e) => broken.push(format!("{}: {}", path.display(), e)),
        }
    }
    Ok((valid, broken))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_artifact(dir: &Path, file: &str, body: &str) {
        std::fs::write(dir.join(file), body).unwrap();
    }

    fn valid_artifact(id: &str) -> String {
        serde_json::json!({
            "model_id": id,
            "name": format!("{id} model"),
            "version": "1.0.0",
            "created_at": "2025-11-03T10:00:00Z",
            "type": "sync",
            "feature_names": ["f1", "f2"],
            "lower_bounds": [0.0, 0.0],
            "upper_bounds": [10.0, 10.0],
            "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
            "predictor": {"kind": "linear", "intercept": 0.0, "coefficients": [1.0, 1.0]}
        })
        .to_string()
    }

    #[test]
    fn test_check_artifacts_all_valid() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "a.json", &valid_artifact("alpha"));
        write_artifact(dir.path(), "b.json", &valid_artifact("beta"));

        let (valid, broken) = check_artifacts(dir.path()).unwrap();
        assert_eq!(valid.len(), 2);
        assert!(broken.is_empty());
        assert!(valid[0].starts_with("alpha v1.0.0"));
    }

    #[test]
    fn test_check_artifacts_reports_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "good.json", &valid_artifact("good"));
        write_artifact(dir.path(), "bad.json", "{ not json");

        let (valid, broken) = check_artifacts(dir.path()).unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(broken.len(), 1);
        assert!(broken[0].contains("bad.json"));
    }

    #[test]
    fn test_check_artifacts_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "notes.txt", "not an artifact");

        let (valid, broken) = check_artifacts(dir.path()).unwrap();
        assert!(valid.is_empty());
        assert!(broken.is_empty());
    }

    #[test]
    fn test_check_artifacts_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(check_artifacts(&missing).is_err());
    }

    #[test]
    fn test_check_artifacts_rejects_schema_violations() {
        // Bounds arrays shorter than the feature list.
        let dir = tempfile::tempdir().unwrap();
        let body = serde_json::json!({
            "model_id": "short",
            "name": "short",
            "version": "1.0.0",
            "created_at": "2025-11-03T10:00:00Z",
            "type": "sync",
            "feature_names": ["f1", "f2"],
            "lower_bounds": [0.0],
            "upper_bounds": [10.0, 10.0],
            "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
            "predictor": {"kind": "linear", "intercept": 0.0, "coefficients": [1.0, 1.0]}
        })
        .to_string();
        write_artifact(dir.path(), "short.json", &body);

        let (valid, broken) = check_artifacts(dir.path()).unwrap();
        assert!(valid.is_empty());
        assert_eq!(broken.len(), 1);
        assert!(broken[0].contains("bounds length mismatch"));
    }
}
