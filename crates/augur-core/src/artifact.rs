//! Model artifacts: the on-disk bundle format and its numeric payload.
//!
//! An artifact is a single JSON document holding the model metadata, the
//! input schema (feature names and winsorization bounds), the standard
//! scaler fitted at training time, and the serialized predictor. Artifacts
//! are immutable once written; the registry loads them at startup and never
//! mutates them afterwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AugurError;
use crate::model::{ExecutionMode, ModelDescriptor, ModelId};

/// Failure while reading or validating an artifact file.
///
/// These never reach API callers: the registry logs them and skips the
/// offending file.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, String),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, String),

    #[error("invalid artifact: {0}")]
    Invalid(String),
}

/// Per-feature standardization fitted at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Scaler that leaves values untouched. Handy for tests and for models
    /// trained on already-normalized features.
    pub fn identity(n_features: usize) -> Self {
        StandardScaler {
            mean: vec![0.0; n_features],
            scale: vec![1.0; n_features],
        }
    }

    /// Apply `(x - mean) / scale` columnwise.
    ///
    /// Rows must already be projected to the feature order the scaler was
    /// fitted on. A zero scale yields a non-finite output, which the
    /// preprocessing pipeline rejects afterwards.
    pub fn transform(&self, matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
        matrix
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.mean)
                    .zip(&self.scale)
                    .map(|((x, mean), scale)| (x - mean) / scale)
                    .collect()
            })
            .collect()
    }
}

/// One node in a serialized decision tree.
///
/// Leaf nodes carry `leaf` and ignore the split fields; split nodes carry a
/// feature index, a threshold and the indices of both children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<f64>,
    #[serde(default)]
    pub feature: usize,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
}

impl TreeNode {
    pub fn leaf(value: f64) -> Self {
        TreeNode {
            leaf: Some(value),
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
        }
    }

    pub fn split(feature: usize, threshold: f64, left: usize, right: usize) -> Self {
        TreeNode {
            leaf: None,
            feature,
            threshold,
            left,
            right,
        }
    }
}

/// A single regression tree, nodes stored in a flat array rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk the tree for one row. Values below the threshold descend left.
    ///
    /// The walk is capped at the node count so a malformed (cyclic) tree
    /// fails cleanly instead of spinning.
    pub fn evaluate(&self, row: &[f64]) -> Result<f64, AugurError> {
        let mut idx = 0usize;
        for _ in 0..=self.nodes.len() {
            let node = self.nodes.get(idx).ok_or_else(|| {
                AugurError::Internal(format!("tree node index {idx} out of range"))
            })?;
            if let Some(value) = node.leaf {
                return Ok(value);
            }
            let feature = row.get(node.feature).copied().ok_or_else(|| {
                AugurError::Internal(format!(
                    "tree split on feature {} but row has {} columns",
                    node.feature,
                    row.len()
                ))
            })?;
            idx = if feature < node.threshold {
                node.left
            } else {
                node.right
            };
        }
        Err(AugurError::Internal(
            "tree walk exceeded node count, tree is malformed".to_string(),
        ))
    }
}

/// Serialized predictor, tagged by family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predictor {
    /// Linear model: `intercept + coefficients . x`.
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    /// Gradient-boosted decision trees: `base_score + sum(tree(x))`.
    Gbdt { base_score: f64, trees: Vec<Tree> },
}

impl Predictor {
    /// Score every row of an already-preprocessed matrix.
    pub fn predict(&self, matrix: &[Vec<f64>]) -> Result<Vec<f64>, AugurError> {
        match self {
            Predictor::Linear {
                intercept,
                coefficients,
            } => matrix
                .iter()
                .map(|row| {
                    if row.len() != coefficients.len() {
                        return Err(AugurError::Internal(format!(
                            "linear predictor expects {} features, row has {}",
                            coefficients.len(),
                            row.len()
                        )));
                    }
                    let dot: f64 = row.iter().zip(coefficients).map(|(x, w)| x * w).sum();
                    Ok(intercept + dot)
                })
                .collect(),
            Predictor::Gbdt { base_score, trees } => matrix
                .iter()
                .map(|row| {
                    trees
                        .iter()
                        .try_fold(*base_score, |acc, tree| Ok(acc + tree.evaluate(row)?))
                })
                .collect(),
        }
    }
}

/// On-disk artifact document. `type` carries the execution mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactFile {
    model_id: String,
    name: String,
    #[serde(default)]
    description: String,
    version: String,
    created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    execution_mode: ExecutionMode,
    feature_names: Vec<String>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
    scaler: StandardScaler,
    predictor: Predictor,
}

/// A fully loaded, validated model: metadata plus numeric payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    pub descriptor: ModelDescriptor,
    pub feature_names: Vec<String>,
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    pub scaler: StandardScaler,
    pub predictor: Predictor,
}

impl ArtifactBundle {
    /// Read and validate one artifact file.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ArtifactError::Io(path.to_path_buf(), e.to_string()))?;
        let file: ArtifactFile = serde_json::from_str(&raw)
            .map_err(|e| ArtifactError::Parse(path.to_path_buf(), e.to_string()))?;
        let bundle = ArtifactBundle {
            descriptor: ModelDescriptor {
                model_id: ModelId(file.model_id),
                name: file.name,
                description: file.description,
                version: file.version,
                created_at: file.created_at,
                required_features: file.feature_names.clone(),
                execution_mode: file.execution_mode,
                artifact_location: path.to_path_buf(),
            },
            feature_names: file.feature_names,
            lower_bounds: file.lower_bounds,
            upper_bounds: file.upper_bounds,
            scaler: file.scaler,
            predictor: file.predictor,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn model_id(&self) -> &ModelId {
        &self.descriptor.model_id
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.descriptor.execution_mode
    }

    /// Score a preprocessed matrix with this bundle's predictor.
    pub fn predict(&self, matrix: &[Vec<f64>]) -> Result<Vec<f64>, AugurError> {
        self.predictor.predict(matrix)
    }

    /// Structural checks applied at load time.
    ///
    /// A bundle that passes here can preprocess and score any input that
    /// clears schema validation without index panics. Numeric degeneracies
    /// (zero scale, cyclic trees with in-range indices) are left to the
    /// runtime paths, which report them as internal errors.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let n = self.feature_names.len();
        if self.descriptor.model_id.as_str().is_empty() {
            return Err(ArtifactError::Invalid("model_id is empty".to_string()));
        }
        if n == 0 {
            return Err(ArtifactError::Invalid(
                "feature_names must not be empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(ArtifactError::Invalid(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }
        if self.lower_bounds.len() != n || self.upper_bounds.len() != n {
            return Err(ArtifactError::Invalid(format!(
                "bounds length mismatch: {} features, {} lower, {} upper",
                n,
                self.lower_bounds.len(),
                self.upper_bounds.len()
            )));
        }
        for (i, (lo, hi)) in self.lower_bounds.iter().zip(&self.upper_bounds).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(ArtifactError::Invalid(format!(
                    "non-finite bound for feature '{}'",
                    self.feature_names[i]
                )));
            }
            if lo > hi {
                return Err(ArtifactError::Invalid(format!(
                    "lower bound {} exceeds upper bound {} for feature '{}'",
                    lo, hi, self.feature_names[i]
                )));
            }
        }
        if self.scaler.mean.len() != n || self.scaler.scale.len() != n {
            return Err(ArtifactError::Invalid(format!(
                "scaler length mismatch: {} features, {} mean, {} scale",
                n,
                self.scaler.mean.len(),
                self.scaler.scale.len()
            )));
        }
        match &self.predictor {
            Predictor::Linear { coefficients, .. } => {
                if coefficients.len() != n {
                    return Err(ArtifactError::Invalid(format!(
                        "linear predictor has {} coefficients for {} features",
                        coefficients.len(),
                        n
                    )));
                }
            }
            Predictor::Gbdt { trees, .. } => {
                for (t, tree) in trees.iter().enumerate() {
                    if tree.nodes.is_empty() {
                        return Err(ArtifactError::Invalid(format!("tree {t} has no nodes")));
                    }
                    for (i, node) in tree.nodes.iter().enumerate() {
                        if node.leaf.is_some() {
                            continue;
                        }
                        if node.feature >= n {
                            return Err(ArtifactError::Invalid(format!(
                                "tree {t} node {i} splits on feature {} of {}",
                                node.feature, n
                            )));
                        }
                        if node.left >= tree.nodes.len() || node.right >= tree.nodes.len() {
                            return Err(ArtifactError::Invalid(format!(
                                "tree {t} node {i} references a child out of range"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_bundle() -> ArtifactBundle {
        ArtifactBundle {
            descriptor: ModelDescriptor {
                model_id: ModelId::from("m1"),
                name: "m1".to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                created_at: "2025-11-03T10:00:00Z".parse().unwrap(),
                required_features: vec!["f1".to_string(), "f2".to_string()],
                execution_mode: ExecutionMode::Sync,
                artifact_location: PathBuf::new(),
            },
            feature_names: vec!["f1".to_string(), "f2".to_string()],
            lower_bounds: vec![0.0, 0.0],
            upper_bounds: vec![10.0, 10.0],
            scaler: StandardScaler::identity(2),
            predictor: Predictor::Linear {
                intercept: 1.0,
                coefficients: vec![2.0, -1.0],
            },
        }
    }

    #[test]
    fn test_scaler_transform() {
        let scaler = StandardScaler {
            mean: vec![1.0, 10.0],
            scale: vec![2.0, 5.0],
        };
        let out = scaler.transform(&[vec![3.0, 20.0], vec![1.0, 10.0]]);
        assert_eq!(out, vec![vec![1.0, 2.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn test_scaler_zero_scale_is_not_finite() {
        let scaler = StandardScaler {
            mean: vec![0.0],
            scale: vec![0.0],
        };
        let out = scaler.transform(&[vec![1.0]]);
        assert!(!out[0][0].is_finite());
    }

    #[test]
    fn test_linear_predict() {
        let bundle = linear_bundle();
        let preds = bundle.predict(&[vec![1.0, 1.0], vec![0.0, 3.0]]).unwrap();
        assert_eq!(preds, vec![2.0, -2.0]);
    }

    #[test]
    fn test_gbdt_predict() {
        // Single split on f0 at 0.5: left leaf 1.0, right leaf 2.0.
        let tree = Tree {
            nodes: vec![
                TreeNode::split(0, 0.5, 1, 2),
                TreeNode::leaf(1.0),
                TreeNode::leaf(2.0),
            ],
        };
        let predictor = Predictor::Gbdt {
            base_score: 0.5,
            trees: vec![tree],
        };
        let preds = predictor.predict(&[vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(preds, vec![1.5, 2.5]);
    }

    #[test]
    fn test_gbdt_cyclic_tree_fails_cleanly() {
        // Two split nodes pointing at each other. Indices are in range, so
        // this passes load validation and must be caught by the walk cap.
        let tree = Tree {
            nodes: vec![TreeNode::split(0, 0.5, 1, 1), TreeNode::split(0, 0.5, 0, 0)],
        };
        let err = tree.evaluate(&[1.0]).unwrap_err();
        assert!(matches!(err, AugurError::Internal(_)));
    }

    #[test]
    fn test_validate_rejects_length_mismatches() {
        let mut bundle = linear_bundle();
        bundle.lower_bounds = vec![0.0];
        assert!(matches!(
            bundle.validate(),
            Err(ArtifactError::Invalid(msg)) if msg.contains("bounds length mismatch")
        ));

        let mut bundle = linear_bundle();
        bundle.scaler = StandardScaler::identity(3);
        assert!(bundle.validate().is_err());

        let mut bundle = linear_bundle();
        bundle.predictor = Predictor::Linear {
            intercept: 0.0,
            coefficients: vec![1.0],
        };
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut bundle = linear_bundle();
        bundle.lower_bounds = vec![5.0, 0.0];
        bundle.upper_bounds = vec![1.0, 10.0];
        assert!(bundle.validate().is_err());

        let mut bundle = linear_bundle();
        bundle.upper_bounds = vec![f64::INFINITY, 10.0];
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_features() {
        let mut bundle = linear_bundle();
        bundle.feature_names = vec!["f1".to_string(), "f1".to_string()];
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_tree_children() {
        let mut bundle = linear_bundle();
        bundle.predictor = Predictor::Gbdt {
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![TreeNode::split(0, 0.5, 1, 7)],
            }],
        };
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m1.json");
        let doc = serde_json::json!({
            "model_id": "m1",
            "name": "Demo",
            "description": "demo model",
            "version": "1.0.0",
            "created_at": "2025-11-03T10:00:00Z",
            "type": "async",
            "feature_names": ["f1", "f2"],
            "lower_bounds": [0.0, 0.0],
            "upper_bounds": [10.0, 10.0],
            "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
            "predictor": {"kind": "linear", "intercept": 0.0, "coefficients": [1.0, 1.0]}
        });
        std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

        let bundle = ArtifactBundle::load(&path).unwrap();
        assert_eq!(bundle.model_id().as_str(), "m1");
        assert_eq!(bundle.execution_mode(), ExecutionMode::Async);
        assert_eq!(bundle.descriptor.required_features, vec!["f1", "f2"]);
        assert_eq!(bundle.descriptor.artifact_location, path);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ArtifactBundle::load(&path),
            Err(ArtifactError::Parse(_, _))
        ));

        let missing = dir.path().join("nope.json");
        assert!(matches!(
            ArtifactBundle::load(&missing),
            Err(ArtifactError::Io(_, _))
        ));
    }
}
