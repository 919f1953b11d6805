//! Worker pool: consumes job payloads, runs inference, persists outcomes.
//!
//! Each worker process owns a full model registry and re-runs the whole
//! preprocessing pipeline on the raw records it receives. The queue is
//! not trusted to carry preprocessed data: a worker built from the same
//! artifacts must reach the same matrix on its own.
//!
//! Failure handling is split by class. Transient failures (model not in
//! the local registry, backing services unreachable) requeue the job with
//! a bumped attempt counter until the retry budget runs out. Fatal
//! failures (bad input, predictor errors) write FAILURE immediately.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use augur_core::{
    preprocess, AugurError, JobPayload, JobRecord, JobStatus, ModelRegistry, PredictionResult,
};

use crate::metrics::Metrics;
use crate::queue::{JobConsumer, JobQueue};
use crate::store::ResultStore;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Tunables for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Parallel consumer tasks per process.
    pub concurrency: usize,
    /// Requeues allowed per job before a transient failure turns terminal.
    pub max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// One worker: registry, queue access for requeues, and the result store.
pub struct Worker {
    registry: Arc<ModelRegistry>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ResultStore>,
    metrics: Metrics,
    max_retries: u32,
}

impl Worker {
    pub fn new(
        registry: Arc<ModelRegistry>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let metrics = Metrics::new();
        metrics.set_models_loaded(registry.len());
        Worker {
            registry,
            queue,
            store,
            metrics,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Share a metrics registry instead of the worker's own.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        metrics.set_models_loaded(self.registry.len());
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Handle one delivered payload through to a store write.
    ///
    /// Never returns an error: every outcome of a delivery, including "we
    /// could not even record the outcome", ends in a log line and the best
    /// store state we could reach. The queue has no redelivery protocol to
    /// report errors into.
    pub async fn process(&self, payload: JobPayload) {
        // Redeliveries of finished jobs are dropped before claiming them,
        // so a poller never sees a terminal job bounce back to STARTED.
        match self.store.get(&payload.job_id).await {
            Ok(Some(existing)) if existing.status.is_terminal() => {
                debug!(
                    "job {} is already {}, dropping redelivery",
                    payload.job_id, existing.status
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "could not check job {} before claiming it: {}",
                    payload.job_id, e
                );
            }
        }

        let base = JobRecord::from_payload(&payload);
        if let Err(e) = self.store.put(&base.with_status(JobStatus::Started)).await {
            warn!("failed to mark job {} STARTED: {}", payload.job_id, e);
        }

        let started = Instant::now();
        match self.run_inference(&payload) {
            Ok(result) => {
                let n = result.predictions.len();
                match self.store.put(&base.succeeded(result)).await {
                    Ok(()) => {
                        self.metrics.record_job(
                            base.model_id.as_str(),
                            "success",
                            started.elapsed().as_secs_f64(),
                        );
                        info!(
                            "job {} succeeded: {} predictions with model '{}'",
                            payload.job_id, n, payload.model_id
                        );
                    }
                    Err(e) => {
                        warn!(
                            "job {} computed but result write failed: {}",
                            payload.job_id, e
                        );
                        self.requeue_or_fail(
                            &base,
                            &payload,
                            format!("result write failed: {e}"),
                            started,
                        )
                        .await;
                    }
                }
            }
            Err(err) if err.is_transient() => {
                warn!("job {} hit a transient failure: {}", payload.job_id, err);
                self.requeue_or_fail(&base, &payload, err.to_string(), started).await;
            }
            Err(err) => {
                // Fatal. Internal details stay in the log; the stored
                // record gets a generic detail the poller may see.
                let detail = match &err {
                    AugurError::Internal(inner) => {
                        error!("job {} internal error: {}", payload.job_id, inner);
                        "internal error during prediction".to_string()
                    }
                    other => {
                        warn!("job {} failed: {}", payload.job_id, other);
                        other.to_string()
                    }
                };
                self.finish_failed(&base, detail, started).await;
            }
        }
    }

    /// Preprocess and score one payload against the local registry.
    fn run_inference(&self, payload: &JobPayload) -> Result<PredictionResult, AugurError> {
        let bundle = self.registry.lookup(&payload.model_id).ok_or_else(|| {
            AugurError::NotFound(format!(
                "model '{}' is not in this worker's registry",
                payload.model_id
            ))
        })?;
        let matrix = preprocess(&payload.records, bundle)?;
        let clock = Instant::now();
        let predictions = bundle.predict(&matrix)?;
        Ok(PredictionResult::new(predictions, clock.elapsed()))
    }

    async fn requeue_or_fail(
        &self,
        base: &JobRecord,
        payload: &JobPayload,
        detail: String,
        started: Instant,
    ) {
        if payload.attempt < self.max_retries {
            if let Err(e) = self.store.put(&base.with_status(JobStatus::Retry)).await {
                warn!("failed to mark job {} RETRY: {}", payload.job_id, e);
            }
            let next = payload.next_attempt();
            match self.queue.publish(&next).await {
                Ok(()) => {
                    self.metrics.record_retry(base.model_id.as_str());
                    info!(
                        "job {} requeued (attempt {} of {}): {}",
                        payload.job_id, next.attempt, self.max_retries, detail
                    );
                }
                Err(e) => {
                    self.finish_failed(base, format!("{detail}; requeue failed: {e}"), started)
                        .await;
                }
            }
        } else {
            self.finish_failed(
                base,
                format!("giving up after {} attempts: {detail}", payload.attempt + 1),
                started,
            )
            .await;
        }
    }

    async fn finish_failed(&self, base: &JobRecord, detail: String, started: Instant) {
        if let Err(e) = self.store.put(&base.failed(detail)).await {
            error!("failed to persist FAILURE for job {}: {}", base.job_id, e);
        }
        self.metrics.record_job(
            base.model_id.as_str(),
            "failure",
            started.elapsed().as_secs_f64(),
        );
    }
}

/// Drive one consumer until its queue closes.
pub async fn consume<C: JobConsumer>(worker: Arc<Worker>, mut consumer: C) {
    loop {
        match consumer.next_job().await {
            Ok(Some(payload)) => worker.process(payload).await,
            Ok(None) => {
                info!("job queue closed, consumer exiting");
                return;
            }
            Err(e) => {
                warn!("job consume failed, consumer exiting: {}", e);
                return;
            }
        }
    }
}
