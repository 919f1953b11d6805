//! Model identity and metadata.
//!
//! A [`ModelDescriptor`] is the caller-visible half of a loaded artifact:
//! everything needed to list a model, inspect its input schema, and route a
//! request down the correct execution path. The numeric payload (scaler,
//! bounds, predictor) lives in [`crate::artifact::ArtifactBundle`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a model within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        ModelId(s.to_string())
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        ModelId(s)
    }
}

/// How predictions against a model are executed.
///
/// The mode is declared in the artifact and is not negotiable per request:
/// a synchronous model only answers on the inline endpoint, an asynchronous
/// one only through the job queue. The wire value is the artifact's `type`
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Async => "async",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-visible metadata for one loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: ModelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    /// Feature names the model requires, in training order.
    pub required_features: Vec<String>,
    #[serde(rename = "type")]
    pub execution_mode: ExecutionMode,
    /// Where the artifact was loaded from. Not part of the wire format.
    #[serde(skip)]
    pub artifact_location: PathBuf,
}

/// Compact listing entry for the model index endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_id: ModelId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub execution_mode: ExecutionMode,
}

impl From<&ModelDescriptor> for ModelSummary {
    fn from(desc: &ModelDescriptor) -> Self {
        ModelSummary {
            model_id: desc.model_id.clone(),
            name: desc.name.clone(),
            description: desc.description.clone(),
            execution_mode: desc.execution_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            model_id: ModelId::from("momentum"),
            name: "Momentum".to_string(),
            description: "Cross-sectional momentum score".to_string(),
            version: "1.2.0".to_string(),
            created_at: "2025-11-03T10:00:00Z".parse().unwrap(),
            required_features: vec!["f1".to_string(), "f2".to_string()],
            execution_mode: ExecutionMode::Sync,
            artifact_location: PathBuf::from("/tmp/momentum.json"),
        }
    }

    #[test]
    fn test_execution_mode_wire_format() {
        assert_eq!(serde_json::to_string(&ExecutionMode::Sync).unwrap(), "\"sync\"");
        assert_eq!(serde_json::to_string(&ExecutionMode::Async).unwrap(), "\"async\"");
        let mode: ExecutionMode = serde_json::from_str("\"async\"").unwrap();
        assert_eq!(mode, ExecutionMode::Async);
    }

    #[test]
    fn test_descriptor_serializes_mode_as_type() {
        let json = serde_json::to_value(descriptor()).unwrap();
        assert_eq!(json["type"], "sync");
        assert!(json.get("execution_mode").is_none());
        // The on-disk location never leaves the process.
        assert!(json.get("artifact_location").is_none());
    }

    #[test]
    fn test_summary_from_descriptor() {
        let desc = descriptor();
        let summary = ModelSummary::from(&desc);
        assert_eq!(summary.model_id, desc.model_id);
        assert_eq!(summary.execution_mode, ExecutionMode::Sync);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "sync");
        assert!(json.get("version").is_none());
    }

    #[test]
    fn test_model_id_display() {
        assert_eq!(ModelId::from("m1").to_string(), "m1");
        assert_eq!(ModelId::from("m1").as_str(), "m1");
    }
}
