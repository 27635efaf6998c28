//! Session inventory DTOs

use chrono::{DateTime, Utc};
use keygate_auth::SessionView;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One session, merged with its transport metadata where present
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl From<SessionView> for SessionDto {
    fn from(view: SessionView) -> Self {
        Self {
            id: view.id,
            ip: view.ip,
            user_agent: view.user_agent,
            last_used_at: view.last_used_at,
            last_login_at: view.last_login_at,
            login_method: view.login_method,
            created_at: view.created_at,
            expires_at: view.expires_at,
            is_current: view.is_current,
        }
    }
}

/// `data` payload for `GET /sessions`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionsData {
    pub sessions: Vec<SessionDto>,
}

/// `data` payload for revocation endpoints
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokedData {
    pub revoked: u64,
}
