//! OAuth handlers
//!
//! Authorization-URL generation, the provider callback (which redirects the
//! browser back to the frontend with tokens in the query string), and linked
//! provider management.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use std::sync::Arc;

use crate::dto::{ApiResponse, AuthUrlData, EmptyResponse, OAuthCallbackQuery, ProviderDto, ProvidersData};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ClientIp, RequireAuth, UserAgent};
use crate::state::AppState;
use keygate_auth::OAuthProvider;

fn parse_provider(slug: &str) -> ApiResult<OAuthProvider> {
    OAuthProvider::from_slug(slug)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown OAuth provider: {}", slug)))
}

/// Generate the provider authorization URL bound to a one-time state nonce
#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/{provider}",
    tag = "OAuth",
    params(("provider" = String, Path, description = "google or github")),
    responses(
        (status = 200, description = "Authorization URL", body = AuthUrlData),
        (status = 404, description = "Unknown provider")
    )
)]
pub async fn authorize_url(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> ApiResult<Json<ApiResponse<AuthUrlData>>> {
    let provider = parse_provider(&provider)?;

    let auth_url = state.auth.oauth.authorization_url(provider).await?;

    Ok(Json(ApiResponse::data(AuthUrlData { auth_url })))
}

/// Provider callback. On success the browser is redirected to the frontend
/// with `accessToken`, `refreshToken` and `isNewUser` in the query string;
/// on failure it is redirected to the frontend error page so browser flows
/// never dead-end on a JSON body.
#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/{provider}/callback",
    tag = "OAuth",
    params(
        ("provider" = String, Path, description = "google or github"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "State nonce")
    ),
    responses(
        (status = 302, description = "Redirect to the frontend with tokens or an error message")
    )
)]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    ClientIp(ip): ClientIp,
    UserAgent(user_agent): UserAgent,
) -> Result<Redirect, Redirect> {
    let frontend = state.auth.config().frontend_url.clone();

    let provider = match OAuthProvider::from_slug(&provider) {
        Some(provider) => provider,
        None => return Err(error_redirect(&frontend, "Unknown OAuth provider")),
    };

    if let Some(error) = query.error.as_deref() {
        return Err(error_redirect(&frontend, error));
    }

    let (code, nonce) = match (query.code.as_deref(), query.state.as_deref()) {
        (Some(code), Some(nonce)) => (code, nonce),
        _ => return Err(error_redirect(&frontend, "Missing code or state parameter")),
    };

    match state
        .auth
        .oauth
        .callback(provider, code, nonce, ip, user_agent)
        .await
    {
        Ok(login) => Ok(frontend_redirect(
            &frontend,
            "/auth/callback",
            &[
                ("accessToken", login.tokens.access_token.as_str()),
                ("refreshToken", login.tokens.refresh_token.as_str()),
                ("isNewUser", if login.is_new_user { "true" } else { "false" }),
            ],
        )),
        Err(e) => Err(error_redirect(&frontend, &e.client_message())),
    }
}

fn error_redirect(frontend: &str, message: &str) -> Redirect {
    frontend_redirect(frontend, "/auth/error", &[("message", message)])
}

/// Assemble a frontend redirect with properly encoded query parameters
fn frontend_redirect(frontend: &str, path: &str, params: &[(&str, &str)]) -> Redirect {
    match url::Url::parse(frontend).and_then(|base| base.join(path)) {
        Ok(mut target) => {
            for (name, value) in params {
                target.query_pairs_mut().append_pair(name, value);
            }
            Redirect::to(target.as_str())
        }
        Err(e) => {
            tracing::warn!(error = %e, "frontend URL is not parseable");
            Redirect::to(frontend)
        }
    }
}

/// List the providers linked to the authenticated user
#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/linked",
    tag = "OAuth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Linked providers", body = ProvidersData),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn linked_providers(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> ApiResult<Json<ApiResponse<ProvidersData>>> {
    let providers = state.auth.oauth.linked_providers(user.user_id).await?;

    Ok(Json(ApiResponse::data(ProvidersData {
        providers: providers.into_iter().map(ProviderDto::from).collect(),
    })))
}

/// Unlink a provider. Refused when it is the only remaining sign-in method.
#[utoipa::path(
    delete,
    path = "/api/v1/auth/oauth/{provider}",
    tag = "OAuth",
    params(("provider" = String, Path, description = "google or github")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Provider unlinked"),
        (status = 400, description = "Refused: last remaining sign-in method"),
        (status = 404, description = "Provider not linked")
    )
)]
pub async fn unlink_provider(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Path(provider): Path<String>,
) -> ApiResult<Json<EmptyResponse>> {
    let provider = parse_provider(&provider)?;

    state
        .auth
        .oauth
        .unlink_provider(user.user_id, provider)
        .await?;

    Ok(Json(EmptyResponse::message(format!(
        "{} unlinked",
        provider
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn location_of(redirect: Redirect) -> String {
        let response = redirect.into_response();
        response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_frontend_redirect_encodes_query() {
        let location = location_of(frontend_redirect(
            "http://localhost:5173",
            "/auth/error",
            &[("message", "Invalid or expired OAuth state parameter")],
        ));

        assert!(location.starts_with("http://localhost:5173/auth/error?message="));
        assert!(!location.contains(' '));
        assert!(location.contains("Invalid"));
    }

    #[test]
    fn test_frontend_redirect_joins_path() {
        let location = location_of(frontend_redirect(
            "http://localhost:5173",
            "/auth/callback",
            &[("isNewUser", "true")],
        ));

        assert_eq!(
            location,
            "http://localhost:5173/auth/callback?isNewUser=true"
        );
    }
}
