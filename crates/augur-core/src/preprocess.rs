//! Input preprocessing: schema validation, winsorization and scaling.
//!
//! Every prediction request passes through [`preprocess`] before it reaches
//! a predictor, on both the serving side and the worker side. The pipeline
//! is deterministic and pure, so running it twice on the same input is safe
//! and yields the same matrix.

use std::collections::BTreeMap;

use crate::artifact::ArtifactBundle;
use crate::error::AugurError;

/// One input record: feature name to numeric value.
pub type RawRecord = BTreeMap<String, f64>;

/// Numeric matrix ready for a predictor, rows in input order, columns in the
/// model's feature order.
pub type FeatureMatrix = Vec<Vec<f64>>;

/// Validate, winsorize and scale a batch of records against a model bundle.
///
/// Schema validation treats the batch as a table: a feature counts as
/// present when any record carries it. Features absent from the whole batch
/// fail validation; a cell absent from an individual record is filled at
/// the feature's lower bound by the winsorization step. Keys not named by
/// the model are ignored.
///
/// Output is guaranteed finite. A non-finite value after scaling (for
/// instance from a degenerate zero-scale column) is an internal error, not
/// a caller error.
pub fn preprocess(
    records: &[RawRecord],
    bundle: &ArtifactBundle,
) -> Result<FeatureMatrix, AugurError> {
    let missing = missing_features(records, &bundle.feature_names);
    if !missing.is_empty() {
        return Err(AugurError::Validation(format!(
            "missing required features: {missing:?}"
        )));
    }

    let clipped: FeatureMatrix = records
        .iter()
        .map(|record| {
            bundle
                .feature_names
                .iter()
                .zip(&bundle.lower_bounds)
                .zip(&bundle.upper_bounds)
                .map(|((name, lo), hi)| {
                    // f64::max(NaN, lo) is lo, so an absent cell lands on
                    // the lower bound and stays finite.
                    let value = record.get(name).copied().unwrap_or(f64::NAN);
                    value.max(*lo).min(*hi)
                })
                .collect()
        })
        .collect();

    let scaled = bundle.scaler.transform(&clipped);

    for (i, row) in scaled.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            if !value.is_finite() {
                return Err(AugurError::Internal(format!(
                    "scaling produced a non-finite value for feature '{}' in record {}",
                    bundle.feature_names[j], i
                )));
            }
        }
    }

    Ok(scaled)
}

/// Features the model requires that no record in the batch carries, sorted
/// lexicographically.
fn missing_features(records: &[RawRecord], feature_names: &[String]) -> Vec<String> {
    let mut missing: Vec<String> = feature_names
        .iter()
        .filter(|name| !records.iter().any(|r| r.contains_key(name.as_str())))
        .cloned()
        .collect();
    missing.sort();
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Predictor, StandardScaler};
    use crate::model::{ExecutionMode, ModelDescriptor, ModelId};

    fn bundle(
        features: &[&str],
        lower: &[f64],
        upper: &[f64],
        scaler: StandardScaler,
    ) -> ArtifactBundle {
        let names: Vec<String> = features.iter().map(|s| s.to_string()).collect();
        ArtifactBundle {
            descriptor: ModelDescriptor {
                model_id: ModelId::from("m1"),
                name: "m1".to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                created_at: "2025-11-03T10:00:00Z".parse().unwrap(),
                required_features: names.clone(),
                execution_mode: ExecutionMode::Sync,
                artifact_location: Default::default(),
            },
            feature_names: names,
            lower_bounds: lower.to_vec(),
            upper_bounds: upper.to_vec(),
            scaler,
            predictor: Predictor::Linear {
                intercept: 0.0,
                coefficients: vec![1.0; features.len()],
            },
        }
    }

    fn record(pairs: &[(&str, f64)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_reorders_columns_and_ignores_extras() {
        // Feature order "z", "a" differs from the records' key order, so a
        // correct projection must follow the model, not the input.
        let b = bundle(
            &["z", "a"],
            &[-100.0, -100.0],
            &[100.0, 100.0],
            StandardScaler::identity(2),
        );
        let out = preprocess(&[record(&[("a", 2.0), ("z", 1.0), ("junk", 9.0)])], &b).unwrap();
        assert_eq!(out, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_missing_features_sorted() {
        let b = bundle(
            &["b", "a", "c"],
            &[0.0; 3],
            &[1.0; 3],
            StandardScaler::identity(3),
        );
        let err = preprocess(&[record(&[("c", 0.5)])], &b).unwrap_err();
        assert_eq!(
            err,
            AugurError::Validation("missing required features: [\"a\", \"b\"]".to_string())
        );
    }

    #[test]
    fn test_empty_batch_fails_validation() {
        let b = bundle(&["f1"], &[0.0], &[1.0], StandardScaler::identity(1));
        let err = preprocess(&[], &b).unwrap_err();
        assert!(matches!(err, AugurError::Validation(_)));
    }

    #[test]
    fn test_feature_presence_is_per_batch() {
        // f2 appears only in the first record; the batch is still valid and
        // the second row's f2 cell falls to the lower bound.
        let b = bundle(
            &["f1", "f2"],
            &[0.0, -1.0],
            &[10.0, 1.0],
            StandardScaler::identity(2),
        );
        let out = preprocess(
            &[record(&[("f1", 2.0), ("f2", 0.5)]), record(&[("f1", 3.0)])],
            &b,
        )
        .unwrap();
        assert_eq!(out, vec![vec![2.0, 0.5], vec![3.0, -1.0]]);
    }

    #[test]
    fn test_winsorization_clips_both_ends() {
        let b = bundle(&["f1"], &[0.0], &[10.0], StandardScaler::identity(1));
        let out = preprocess(
            &[record(&[("f1", -3.0)]), record(&[("f1", 42.0)]), record(&[("f1", 7.0)])],
            &b,
        )
        .unwrap();
        assert_eq!(out, vec![vec![0.0], vec![10.0], vec![7.0]]);
    }

    #[test]
    fn test_scaling_applied_after_clip() {
        let b = bundle(
            &["f1"],
            &[0.0],
            &[10.0],
            StandardScaler {
                mean: vec![5.0],
                scale: vec![2.0],
            },
        );
        // 42 clips to 10 first, then scales to (10 - 5) / 2.
        let out = preprocess(&[record(&[("f1", 42.0)])], &b).unwrap();
        assert_eq!(out, vec![vec![2.5]]);
    }

    #[test]
    fn test_non_finite_scale_is_internal_error() {
        let b = bundle(
            &["f1"],
            &[0.0],
            &[10.0],
            StandardScaler {
                mean: vec![0.0],
                scale: vec![0.0],
            },
        );
        let err = preprocess(&[record(&[("f1", 1.0)])], &b).unwrap_err();
        assert!(matches!(err, AugurError::Internal(msg) if msg.contains("f1")));
    }
}
