//! Session inventory handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::dto::{ApiResponse, EmptyResponse, RevokedData, SessionDto, SessionsData};
use crate::error::ApiResult;
use crate::extractors::RequireAuth;
use crate::state::AppState;

/// List the caller's sessions, flagging the current one
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session inventory", body = SessionsData),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> ApiResult<Json<ApiResponse<SessionsData>>> {
    let sessions = state
        .auth
        .sessions
        .list_sessions(user.user_id, user.session_id)
        .await?;

    Ok(Json(ApiResponse::data(SessionsData {
        sessions: sessions.into_iter().map(SessionDto::from).collect(),
    })))
}

/// Revoke every session except the current one
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/other",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Other sessions revoked", body = RevokedData),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn revoke_other_sessions(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> ApiResult<Json<ApiResponse<RevokedData>>> {
    let revoked = state
        .auth
        .sessions
        .revoke_other_sessions(user.user_id, user.session_id)
        .await?;

    tracing::info!(user_id = %user.user_id, revoked, "other sessions revoked");

    Ok(Json(ApiResponse::data(RevokedData { revoked })))
}

/// Revoke one session owned by the caller
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session revoked"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown session or not owned by caller")
    )
)]
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<EmptyResponse>> {
    state
        .auth
        .sessions
        .revoke_session(user.user_id, session_id)
        .await?;

    Ok(Json(EmptyResponse::message("Session revoked")))
}
