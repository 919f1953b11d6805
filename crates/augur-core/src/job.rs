//! Asynchronous job lifecycle: identifiers, payloads, status machine and
//! the persisted job record.
//!
//! A job moves through `PENDING -> STARTED -> SUCCESS | FAILURE`, with
//! `STARTED -> RETRY -> STARTED` loops for transient worker failures.
//! Terminal records are immutable: once `SUCCESS` or `FAILURE` is written,
//! every later write against the same job id is refused, which is what
//! makes repeated polls of a finished job return the same document.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ModelId;
use crate::preprocess::RawRecord;

/// Unique identifier for one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        JobId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        JobId::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Started => "STARTED",
            JobStatus::Retry => "RETRY",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }

    /// Legal forward transitions of the lifecycle.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Started)
                | (Started, Retry)
                | (Started, Success)
                | (Started, Failure)
                | (Retry, Started)
                | (Retry, Failure)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a store may accept a write that would leave the record in
/// `next`, given what it currently holds.
///
/// Rules, in order: an absent record accepts anything (queue delivery can
/// race the submitter's PENDING write); a terminal record accepts nothing,
/// not even a rewrite of the same status; otherwise same-status rewrites
/// and legal transitions pass. Everything else is a stale or duplicate
/// delivery and is dropped.
pub fn write_allowed(existing: Option<JobStatus>, next: JobStatus) -> bool {
    match existing {
        None => true,
        Some(current) if current.is_terminal() => false,
        Some(current) => current == next || current.can_transition(next),
    }
}

/// Outcome of one scored batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predictions: Vec<f64>,
    pub duration_ms: f64,
    pub additional_info: serde_json::Map<String, serde_json::Value>,
}

impl PredictionResult {
    pub fn new(predictions: Vec<f64>, duration: Duration) -> Self {
        let mut additional_info = serde_json::Map::new();
        additional_info.insert("num_inputs".to_string(), predictions.len().into());
        PredictionResult {
            predictions,
            duration_ms: duration.as_secs_f64() * 1000.0,
            additional_info,
        }
    }
}

/// What travels over the job queue to the worker pool.
///
/// Records stay in their raw feature-keyed form so workers can run the full
/// preprocessing pipeline themselves instead of trusting the submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: JobId,
    pub model_id: ModelId,
    pub user_id: String,
    pub submitted_at: DateTime<Utc>,
    pub records: Vec<RawRecord>,
    /// Zero on first delivery, bumped on every requeue.
    #[serde(default)]
    pub attempt: u32,
}

impl JobPayload {
    pub fn new(model_id: ModelId, user_id: impl Into<String>, records: Vec<RawRecord>) -> Self {
        JobPayload {
            job_id: JobId::new(),
            model_id,
            user_id: user_id.into(),
            submitted_at: Utc::now(),
            records,
            attempt: 0,
        }
    }

    /// Copy of this payload with the attempt counter bumped.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next
    }
}

/// Persisted state of a job, as stored and as returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub user_id: String,
    pub job_id: JobId,
    pub model_id: ModelId,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobRecord {
    /// Fresh PENDING record for a payload about to be enqueued.
    pub fn from_payload(payload: &JobPayload) -> Self {
        JobRecord {
            user_id: payload.user_id.clone(),
            job_id: payload.job_id.clone(),
            model_id: payload.model_id.clone(),
            status: JobStatus::Pending,
            submitted_at: payload.submitted_at,
            result: None,
            detail: None,
        }
    }

    /// Same job, different lifecycle state, no outcome attached.
    pub fn with_status(&self, status: JobStatus) -> Self {
        JobRecord {
            status,
            result: None,
            detail: None,
            ..self.clone()
        }
    }

    pub fn succeeded(&self, result: PredictionResult) -> Self {
        JobRecord {
            status: JobStatus::Success,
            result: Some(result),
            detail: None,
            ..self.clone()
        }
    }

    pub fn failed(&self, detail: impl Into<String>) -> Self {
        JobRecord {
            status: JobStatus::Failure,
            result: None,
            detail: Some(detail.into()),
            ..self.clone()
        }
    }
}
