//! Augur Serving - HTTP surface for the model-serving engine.
//!
//! Routes, handlers and the dispatch logic that decides whether a request
//! is scored inline or enqueued for the worker pool. The binary crate
//! wires this up; everything here is transport-agnostic over the
//! `JobQueue` and `ResultStore` traits from `augur-runtime`.

pub mod api;
pub mod auth;
pub mod dispatch;
pub mod health;

use std::sync::Arc;
use std::time::Duration;

use augur_core::ModelRegistry;
use augur_runtime::{JobQueue, Metrics, ResultStore};

use dispatch::Dispatcher;

/// How long readiness waits for a worker to answer a ping.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state behind every route handler.
pub struct ServeContext {
    pub registry: Arc<ModelRegistry>,
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn ResultStore>,
    pub dispatcher: Dispatcher,
    pub metrics: Metrics,
    pub ping_timeout: Duration,
}

pub type SharedContext = Arc<ServeContext>;

impl ServeContext {
    /// Wire up dispatch and metrics over the given backends.
    pub fn new(
        registry: Arc<ModelRegistry>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let metrics = Metrics::new();
        metrics.set_models_loaded(registry.len());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            queue.clone(),
            store.clone(),
            metrics.clone(),
        );
        ServeContext {
            registry,
            queue,
            store,
            dispatcher,
            metrics,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }
}

/// Assemble the shared serving state from its backends.
pub fn shared_context(
    registry: Arc<ModelRegistry>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ResultStore>,
) -> SharedContext {
    Arc::new(ServeContext::new(registry, queue, store))
}
