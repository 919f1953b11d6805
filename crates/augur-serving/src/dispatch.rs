//! Request dispatch: inline scoring or queue submission, by model mode.
//!
//! The dispatcher is the only place that reads a model's execution mode.
//! Requests on the wrong path are refused symmetrically: a sync model
//! cannot be submitted as a job and an async model cannot be scored
//! inline, so a model's mode is an interface contract rather than a hint.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use augur_core::{
    preprocess, AugurError, ExecutionMode, JobId, JobPayload, JobRecord, ModelId, ModelRegistry,
    PredictionResult, RawRecord,
};
use augur_runtime::{JobQueue, Metrics, ResultStore, StoreError};

/// Routes validated requests down the execution path their model declares.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ResultStore>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ResultStore>,
        metrics: Metrics,
    ) -> Self {
        Dispatcher {
            registry,
            queue,
            store,
            metrics,
        }
    }

    /// Score a batch inline against a synchronous model.
    ///
    /// The predictor runs on the blocking pool so a large batch cannot
    /// stall the async workers serving other requests.
    pub async fn predict_sync(
        &self,
        model_id: &ModelId,
        records: &[RawRecord],
    ) -> Result<PredictionResult, AugurError> {
        let bundle = self
            .registry
            .lookup(model_id)
            .ok_or_else(|| AugurError::NotFound(format!("model '{model_id}' not found")))?;
        if bundle.execution_mode() != ExecutionMode::Sync {
            return Err(AugurError::ModeMismatch(format!(
                "model '{model_id}' runs asynchronously; submit it as a job instead"
            )));
        }

        let matrix = preprocess(records, bundle)?;
        let bundle = bundle.clone();
        let result = tokio::task::spawn_blocking(move || {
            let clock = Instant::now();
            let predictions = bundle.predict(&matrix)?;
            Ok(PredictionResult::new(predictions, clock.elapsed()))
        })
        .await
        .map_err(|e| AugurError::Internal(format!("prediction task failed: {e}")))??;

        self.metrics
            .record_prediction(model_id.as_str(), "sync", result.duration_ms / 1000.0);
        Ok(result)
    }

    /// Accept a batch for an asynchronous model: persist PENDING, enqueue.
    ///
    /// The batch is preprocessed eagerly so schema problems fail the
    /// submission right here instead of surfacing as a FAILURE at poll
    /// time. The matrix itself is discarded: the payload carries the
    /// validated raw records and the worker re-runs the same deterministic
    /// pipeline, reaching the identical matrix without trusting the
    /// submitter.
    ///
    /// The PENDING record is written before the payload is published, so a
    /// caller who got a job id can always poll it. If publishing fails the
    /// record is rolled back best-effort and the submission is refused.
    pub async fn submit(
        &self,
        model_id: &ModelId,
        records: Vec<RawRecord>,
        user_id: &str,
    ) -> Result<JobRecord, AugurError> {
        let bundle = self
            .registry
            .lookup(model_id)
            .ok_or_else(|| AugurError::NotFound(format!("model '{model_id}' not found")))?;
        if bundle.execution_mode() != ExecutionMode::Async {
            return Err(AugurError::ModeMismatch(format!(
                "model '{model_id}' runs synchronously; call the prediction endpoint directly"
            )));
        }
        preprocess(&records, bundle)?;

        let payload = JobPayload::new(model_id.clone(), user_id, records);
        let record = JobRecord::from_payload(&payload);
        self.store.put(&record).await.map_err(|e| {
            error!("failed to persist PENDING for job {}: {}", payload.job_id, e);
            AugurError::UpstreamUnavailable("result store unavailable".to_string())
        })?;

        if let Err(e) = self.queue.publish(&payload).await {
            error!("failed to enqueue job {}: {}", payload.job_id, e);
            if let Err(del) = self.store.delete(&payload.job_id).await {
                warn!(
                    "could not roll back PENDING record for job {}: {}",
                    payload.job_id, del
                );
            }
            return Err(AugurError::UpstreamUnavailable(
                "job queue unavailable".to_string(),
            ));
        }

        self.metrics.record_submission(model_id.as_str());
        Ok(record)
    }

    /// Current record for a job, if the store knows it.
    pub async fn poll(&self, job_id: &JobId) -> Result<Option<JobRecord>, AugurError> {
        self.store.get(job_id).await.map_err(|e| match e {
            StoreError::Corrupt(detail) => AugurError::Internal(format!(
                "stored record for job {job_id} is malformed: {detail}"
            )),
            other => {
                AugurError::Internal(format!("result store read failed for job {job_id}: {other}"))
            }
        })
    }
}
