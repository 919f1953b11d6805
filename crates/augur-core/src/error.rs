//! Error taxonomy shared across the serving surface and the worker pool.
//!
//! Every fallible operation in the prediction path maps onto one of these
//! variants, and the HTTP layer maps each variant onto exactly one status
//! code. Keeping the set small and closed is deliberate: a handler that
//! cannot classify a failure reports it as [`AugurError::Internal`], whose
//! detail is logged server-side rather than surfaced to the caller.

use thiserror::Error;

/// Classified failure for the prediction path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AugurError {
    /// Caller-supplied input failed schema validation (HTTP 422).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced model or job does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request arrived on the wrong execution path for the model (HTTP 400).
    #[error("execution mode mismatch: {0}")]
    ModeMismatch(String),

    /// A backing service (queue, result store) refused or timed out (HTTP 503).
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Unexpected failure inside the engine (HTTP 500). The detail string is
    /// for operator logs only and must not be echoed back to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AugurError {
    /// True when retrying the same operation later could succeed.
    ///
    /// The worker pool uses this to decide between requeueing a job and
    /// recording a terminal failure. Model-not-found counts as transient
    /// there: a rolling deploy can leave a worker without an artifact that
    /// another pool member already has.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AugurError::NotFound(_) | AugurError::UpstreamUnavailable(_)
        )
    }
}
