//! Core types for the augur model-serving engine.
//!
//! This crate is the dependency-light heart of the workspace: everything
//! the serving layer and the worker pool agree on lives here.
//!
//! - [`artifact`]: the on-disk bundle format, scaler and predictors
//! - [`registry`]: the immutable per-process model catalog
//! - [`preprocess`]: validation, winsorization and scaling of raw records
//! - [`job`]: job identifiers, payloads and the status machine
//! - [`error`]: the closed failure taxonomy the HTTP layer maps to codes
//!
//! Nothing in here does I/O beyond reading artifact files, and nothing is
//! async; transports and persistence live in `augur-runtime`.

pub mod artifact;
pub mod error;
pub mod job;
pub mod model;
pub mod preprocess;
pub mod registry;

pub use artifact::{ArtifactBundle, ArtifactError, Predictor, StandardScaler, Tree, TreeNode};
pub use error::AugurError;
pub use job::{write_allowed, JobId, JobPayload, JobRecord, JobStatus, PredictionResult};
pub use model::{ExecutionMode, ModelDescriptor, ModelId, ModelSummary};
pub use preprocess::{preprocess, FeatureMatrix, RawRecord};
pub use registry::ModelRegistry;
