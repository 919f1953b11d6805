//! In-memory model registry.
//!
//! Built once at startup by scanning a directory of artifact files, then
//! read-only for the life of the process. A file that fails to load is
//! logged and skipped, so one corrupt artifact cannot take down the rest
//! of the catalog.

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::artifact::ArtifactBundle;
use crate::model::{ModelDescriptor, ModelId, ModelSummary};

/// Immutable catalog of loaded models, keyed by model id.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: FxHashMap<ModelId, Arc<ArtifactBundle>>,
}

impl ModelRegistry {
    /// Scan `model_dir` for `*.json` artifacts and load what parses.
    ///
    /// An unreadable directory yields an empty registry rather than an
    /// error; readiness reporting is the serving layer's job. Files are
    /// visited in sorted order so duplicate-id resolution does not depend
    /// on filesystem enumeration order.
    pub fn build(model_dir: &Path) -> Self {
        let mut registry = ModelRegistry::default();

        let entries = match std::fs::read_dir(model_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("model directory {} is not readable: {}", model_dir.display(), e);
                return registry;
            }
        };

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect();
        paths.sort();

        for path in paths {
            match ArtifactBundle::load(&path) {
                Ok(bundle) => {
                    let id = bundle.model_id().clone();
                    if registry.models.contains_key(&id) {
                        warn!(
                            "duplicate model id '{}' in {}, keeping the first artifact",
                            id,
                            path.display()
                        );
                        continue;
                    }
                    info!(
                        "loaded model '{}' ({} features, {} mode) from {}",
                        id,
                        bundle.feature_names.len(),
                        bundle.execution_mode(),
                        path.display()
                    );
                    registry.models.insert(id, Arc::new(bundle));
                }
                Err(e) => {
                    warn!("skipping artifact {}: {}", path.display(), e);
                }
            }
        }

        info!("model registry ready with {} models", registry.models.len());
        registry
    }

    /// Registry from preloaded bundles. Used by tests and embedded setups.
    pub fn from_bundles(bundles: impl IntoIterator<Item = ArtifactBundle>) -> Self {
        let models = bundles
            .into_iter()
            .map(|b| (b.model_id().clone(), Arc::new(b)))
            .collect();
        ModelRegistry { models }
    }

    /// Full bundle for a model, if loaded.
    pub fn lookup(&self, id: &ModelId) -> Option<&Arc<ArtifactBundle>> {
        self.models.get(id)
    }

    /// Metadata for a model, if loaded.
    pub fn descriptor(&self, id: &ModelId) -> Option<&ModelDescriptor> {
        self.models.get(id).map(|b| &b.descriptor)
    }

    /// Listing entries for every loaded model, sorted by model id.
    pub fn summaries(&self) -> Vec<ModelSummary> {
        let mut summaries: Vec<ModelSummary> = self
            .models
            .values()
            .map(|b| ModelSummary::from(&b.descriptor))
            .collect();
        summaries.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Drop every loaded model. Only meaningful for tests that exercise
    /// empty-registry behavior after construction.
    pub fn clear(&mut self) {
        self.models.clear();
    }
}
