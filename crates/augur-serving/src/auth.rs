//! Caller identity and capability scopes.
//!
//! Augur sits behind a gateway that authenticates callers and injects two
//! headers: `x-user-id` (the principal) and `x-scopes` (comma-separated
//! capabilities). This module turns those headers into a [`Principal`] and
//! enforces per-route scope requirements. A missing identity rejects with
//! 401, a present identity without the required scope with 403; both are
//! mapped to responses by `api::handle_rejection`.

use std::collections::HashSet;

use warp::{Filter, Rejection};

pub const USER_HEADER: &str = "x-user-id";
pub const SCOPES_HEADER: &str = "x-scopes";

pub const SCOPE_MODELS_LIST: &str = "models:list";
pub const SCOPE_MODELS_READ: &str = "models:read";
pub const SCOPE_PREDICTIONS_CREATE: &str = "predictions:create";
pub const SCOPE_PREDICTIONS_READ: &str = "predictions:read";

/// Authenticated caller: identity plus granted capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    scopes: HashSet<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, scopes: impl IntoIterator<Item = String>) -> Self {
        Principal {
            user_id: user_id.into(),
            scopes: scopes.into_iter().collect(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Auth failures raised as warp rejections.
#[derive(Debug)]
pub enum AuthError {
    /// No usable `x-user-id` header (HTTP 401).
    MissingPrincipal,
    /// Identity present but the required scope is not granted (HTTP 403).
    ScopeDenied(&'static str),
}

impl warp::reject::Reject for AuthError {}

fn parse_scopes(raw: Option<String>) -> Vec<String> {
    raw.map(|header| {
        header
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Extract the caller identity, rejecting anonymous requests.
pub fn with_principal() -> impl Filter<Extract = (Principal,), Error = Rejection> + Clone {
    warp::header::optional::<String>(USER_HEADER)
        .and(warp::header::optional::<String>(SCOPES_HEADER))
        .and_then(|user: Option<String>, scopes: Option<String>| async move {
            match user {
                Some(user) if !user.trim().is_empty() => {
                    Ok(Principal::new(user.trim(), parse_scopes(scopes)))
                }
                _ => Err(warp::reject::custom(AuthError::MissingPrincipal)),
            }
        })
}

/// Extract the caller identity and require one capability.
pub fn require_scope(
    scope: &'static str,
) -> impl Filter<Extract = (Principal,), Error = Rejection> + Clone {
    with_principal().and_then(move |principal: Principal| async move {
        if principal.has_scope(scope) {
            Ok(principal)
        } else {
            Err(warp::reject::custom(AuthError::ScopeDenied(scope)))
        }
    })
}
