//! OAuth DTOs

use chrono::{DateTime, Utc};
use keygate_auth::LinkedProvider;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Query parameters delivered by the provider on callback
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Providers report user denial and misconfiguration here
    #[serde(default)]
    pub error: Option<String>,
}

/// `data` payload for `GET /auth/oauth/{provider}`
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlData {
    pub auth_url: String,
}

/// One linked provider
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDto {
    pub provider: String,
    pub linked_at: DateTime<Utc>,
}

impl From<LinkedProvider> for ProviderDto {
    fn from(link: LinkedProvider) -> Self {
        Self {
            provider: link.provider,
            linked_at: link.linked_at,
        }
    }
}

/// `data` payload for `GET /auth/oauth/linked`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvidersData {
    pub providers: Vec<ProviderDto>,
}
