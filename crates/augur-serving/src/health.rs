//! Service info, liveness and readiness handlers.
//!
//! Liveness only says the process is up. Readiness says the service can
//! actually take work: the registry holds at least one model and a worker
//! answered a queue ping within the configured timeout. Responses carry
//! `Cache-Control: no-cache` so orchestrator probes always see the current
//! state.

use std::convert::Infallible;

use tracing::warn;
use warp::http::header::CACHE_CONTROL;
use warp::http::{HeaderValue, StatusCode};
use warp::Reply;

use crate::SharedContext;

fn no_cache(reply: impl Reply) -> warp::reply::Response {
    let mut resp = reply.into_response();
    resp.headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    resp
}

/// GET / - service banner.
pub async fn handle_info(ctx: SharedContext) -> Result<impl Reply, Infallible> {
    let body = serde_json::json!({
        "service": "augur",
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": ctx.registry.len(),
    });
    Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::OK).into_response())
}

/// GET /live - the process is up.
pub async fn handle_liveness() -> Result<impl Reply, Infallible> {
    let body = serde_json::json!({"status": "alive"});
    Ok(no_cache(warp::reply::with_status(
        warp::reply::json(&body),
        StatusCode::OK,
    )))
}

/// GET /ready - the process can serve predictions right now.
pub async fn handle_readiness(ctx: SharedContext) -> Result<impl Reply, Infallible> {
    if ctx.registry.is_empty() {
        let body = serde_json::json!({"status": "not_ready", "reason": "no models loaded"});
        return Ok(no_cache(warp::reply::with_status(
            warp::reply::json(&body),
            StatusCode::SERVICE_UNAVAILABLE,
        )));
    }

    match ctx.queue.ping(ctx.ping_timeout).await {
        Ok(()) => {
            let body = serde_json::json!({
                "status": "ready",
                "models_loaded": ctx.registry.len(),
            });
            Ok(no_cache(warp::reply::with_status(
                warp::reply::json(&body),
                StatusCode::OK,
            )))
        }
        Err(e) => {
            warn!("readiness ping got no worker reply: {}", e);
            let body =
                serde_json::json!({"status": "not_ready", "reason": "worker pool unreachable"});
            Ok(no_cache(warp::reply::with_status(
                warp::reply::json(&body),
                StatusCode::SERVICE_UNAVAILABLE,
            )))
        }
    }
}
