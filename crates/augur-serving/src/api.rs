//! Model-serving REST API routes (warp-based).

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use augur_core::{AugurError, JobId, JobStatus, ModelId, PredictionResult, RawRecord};

use crate::auth::{
    self, AuthError, Principal, SCOPE_MODELS_LIST, SCOPE_MODELS_READ, SCOPE_PREDICTIONS_CREATE,
    SCOPE_PREDICTIONS_READ,
};
use crate::health;
use crate::SharedContext;

// =============================================================================
// Wire types
// =============================================================================

/// Body of both prediction endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub model_id: String,
    pub inputs: Vec<RawRecord>,
}

/// Response of the synchronous prediction endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub user_id: String,
    pub model_id: ModelId,
    pub result: PredictionResult,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiError {
    error: String,
    code: String,
}

// =============================================================================
// Routes
// =============================================================================

/// Build all serving routes.
pub fn routes(
    ctx: SharedContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let info = warp::path::end()
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(health::handle_info);

    let live = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(health::handle_liveness);

    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(health::handle_readiness);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_metrics);

    let list_models = warp::path("models")
        .and(warp::path::end())
        .and(warp::get())
        .and(auth::require_scope(SCOPE_MODELS_LIST))
        .and(with_context(ctx.clone()))
        .and_then(handle_list_models);

    let get_model = warp::path("models")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(auth::require_scope(SCOPE_MODELS_READ))
        .and(with_context(ctx.clone()))
        .and_then(handle_get_model);

    let submit_job = warp::path("predictions")
        .and(warp::path("jobs"))
        .and(warp::path::end())
        .and(warp::post())
        .and(auth::require_scope(SCOPE_PREDICTIONS_CREATE))
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_submit_job);

    let poll_job = warp::path("predictions")
        .and(warp::path("jobs"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(auth::require_scope(SCOPE_PREDICTIONS_READ))
        .and(with_context(ctx.clone()))
        .and_then(handle_poll_job);

    let predict = warp::path("predictions")
        .and(warp::path::end())
        .and(warp::post())
        .and(auth::require_scope(SCOPE_PREDICTIONS_CREATE))
        .and(warp::body::json())
        .and(with_context(ctx))
        .and_then(handle_predict);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "x-user-id", "x-scopes"]);

    // Group routes to avoid warp recursive type overflow
    let health_routes = info.or(live).or(ready).or(metrics).boxed();
    let model_routes = list_models.or(get_model).boxed();
    let prediction_routes = submit_job.or(poll_job).or(predict).boxed();

    health_routes
        .or(model_routes)
        .or(prediction_routes)
        .with(cors)
}

// =============================================================================
// Filters
// =============================================================================

fn with_context(
    ctx: SharedContext,
) -> impl Filter<Extract = (SharedContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /models - list loaded models.
async fn handle_list_models(
    _principal: Principal,
    ctx: SharedContext,
) -> Result<impl Reply, Infallible> {
    let summaries = ctx.registry.summaries();
    Ok(warp::reply::with_status(warp::reply::json(&summaries), StatusCode::OK).into_response())
}

/// GET /models/{id} - full metadata for one model.
async fn handle_get_model(
    model_id: String,
    _principal: Principal,
    ctx: SharedContext,
) -> Result<impl Reply, Infallible> {
    let id = ModelId(model_id);
    match ctx.registry.descriptor(&id) {
        Some(descriptor) => Ok(
            warp::reply::with_status(warp::reply::json(descriptor), StatusCode::OK)
                .into_response(),
        ),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            &format!("Model '{id}' not found"),
        )),
    }
}

/// POST /predictions - inline scoring against a synchronous model.
async fn handle_predict(
    principal: Principal,
    body: PredictRequest,
    ctx: SharedContext,
) -> Result<impl Reply, Infallible> {
    let model_id = ModelId(body.model_id);
    match ctx.dispatcher.predict_sync(&model_id, &body.inputs).await {
        Ok(result) => {
            let resp = PredictResponse {
                user_id: principal.user_id,
                model_id,
                result,
            };
            Ok(warp::reply::with_status(warp::reply::json(&resp), StatusCode::OK).into_response())
        }
        Err(err) => Ok(augur_error_response(err)),
    }
}

/// POST /predictions/jobs - enqueue a batch for an asynchronous model.
async fn handle_submit_job(
    principal: Principal,
    body: PredictRequest,
    ctx: SharedContext,
) -> Result<impl Reply, Infallible> {
    let model_id = ModelId(body.model_id);
    match ctx
        .dispatcher
        .submit(&model_id, body.inputs, &principal.user_id)
        .await
    {
        Ok(record) => Ok(
            warp::reply::with_status(warp::reply::json(&record), StatusCode::ACCEPTED)
                .into_response(),
        ),
        Err(err) => Ok(augur_error_response(err)),
    }
}

/// GET /predictions/jobs/{id} - current state of a submitted job.
async fn handle_poll_job(
    job_id: String,
    _principal: Principal,
    ctx: SharedContext,
) -> Result<impl Reply, Infallible> {
    let job_id = JobId(job_id);
    match ctx.dispatcher.poll(&job_id).await {
        Ok(Some(record)) => {
            let status = match record.status {
                JobStatus::Success => StatusCode::OK,
                JobStatus::Failure => StatusCode::INTERNAL_SERVER_ERROR,
                // PENDING, STARTED and RETRY are all "not done yet".
                _ => StatusCode::ACCEPTED,
            };
            Ok(warp::reply::with_status(warp::reply::json(&record), status).into_response())
        }
        Ok(None) => Ok(error_response(
            StatusCode::NOT_FOUND,
            &format!("Job '{job_id}' not found"),
        )),
        Err(err) => Ok(augur_error_response(err)),
    }
}

/// GET /metrics - Prometheus text exposition.
async fn handle_metrics(ctx: SharedContext) -> Result<impl Reply, Infallible> {
    Ok(
        warp::reply::with_header(
            ctx.metrics.gather(),
            "content-type",
            "text/plain; charset=utf-8",
        )
        .into_response(),
    )
}

// =============================================================================
// Error mapping
// =============================================================================

fn error_response(status: StatusCode, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
        code: status.as_str().to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Map a classified engine error onto its HTTP shape.
///
/// Internal details never reach the wire; they are logged here and the
/// caller sees a generic message.
fn augur_error_response(err: AugurError) -> warp::reply::Response {
    let (status, code) = match &err {
        AugurError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
        AugurError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        AugurError::ModeMismatch(_) => (StatusCode::BAD_REQUEST, "mode_mismatch"),
        AugurError::UpstreamUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
        }
        AugurError::Internal(detail) => {
            tracing::error!("internal error served as 500: {}", detail);
            let body = ApiError {
                error: "internal error".to_string(),
                code: "internal_error".to_string(),
            };
            return warp::reply::with_status(
                warp::reply::json(&body),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response();
        }
    };
    let body = ApiError {
        error: err.to_string(),
        code: code.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Handle warp rejections with specific HTTP status codes and messages.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(auth_err) = err.find::<AuthError>() {
        match auth_err {
            AuthError::MissingPrincipal => Ok(error_response(
                StatusCode::UNAUTHORIZED,
                "Missing caller identity",
            )),
            AuthError::ScopeDenied(scope) => Ok(error_response(
                StatusCode::FORBIDDEN,
                &format!("Scope '{scope}' required"),
            )),
        }
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        Ok(error_response(
            StatusCode::BAD_REQUEST,
            &format!("Invalid request body: {}", e),
        ))
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        Ok(error_response(
            StatusCode::BAD_REQUEST,
            "Invalid query parameters",
        ))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        Ok(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request payload too large",
        ))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        Ok(error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported media type",
        ))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        Ok(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ))
    } else if err.is_not_found() {
        Ok(error_response(StatusCode::NOT_FOUND, "Not found"))
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        Ok(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        ))
    }
}
