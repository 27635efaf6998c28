//! API middleware: CSRF enforcement and per-IP rate limiting

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::extractors::ClientIp;
use crate::state::AppState;

/// Header carrying the CSRF token in both directions
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// CSRF check on state-changing verbs.
///
/// GET/HEAD/OPTIONS pass through; POST/PUT/PATCH/DELETE must present a live
/// token in `X-CSRF-Token`. Tokens are deliberately not bound to a user: the
/// check proves same-origin fetch while identity travels in the bearer token.
pub async fn csrf_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let method = req.method();
    if matches!(
        method.as_str(),
        "GET" | "HEAD" | "OPTIONS"
    ) {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match state.auth.csrf.validate_token(token).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err(ApiError::Forbidden("Invalid or missing CSRF token".to_string())
            .into_response()),
        Err(e) => Err(ApiError::Internal(e.to_string()).into_response()),
    }
}

/// Per-IP rate limiting ahead of every route
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = ip.unwrap_or_else(|| "unknown".to_string());

    match state.auth.rate_limiter.check_ip(&ip).await {
        Ok(()) => Ok(next.run(req).await),
        Err(e) => Err(ApiError::from(e).into_response()),
    }
}
