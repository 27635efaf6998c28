//! Authentication middleware for Axum
//!
//! A tower layer that parses `Authorization: Bearer`, verifies the access
//! token, and inserts the `AuthenticatedUser` principal into request
//! extensions. Requests without credentials pass through so public routes
//! keep working; requests with invalid credentials short-circuit with 401.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::{AuthError, ErrorResponse};
use crate::token::TokenService;
use crate::types::AuthenticatedUser;

/// Authentication middleware layer
#[derive(Clone)]
pub struct AuthLayer {
    tokens: Arc<TokenService>,
}

impl AuthLayer {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    tokens: Arc<TokenService>,
}

impl<S> Service<Request> for AuthMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let tokens = self.tokens.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match authenticate(req.headers(), &tokens) {
                Ok(Some(user)) => {
                    req.extensions_mut().insert(user);
                    inner.call(req).await
                }
                Ok(None) => inner.call(req).await,
                Err(e) => Ok(auth_error_response(e)),
            }
        })
    }
}

/// Parse and verify the bearer token, if any
fn authenticate(
    headers: &HeaderMap,
    tokens: &TokenService,
) -> Result<Option<AuthenticatedUser>, AuthError> {
    let auth_header = match headers.get("Authorization") {
        Some(value) => value,
        None => return Ok(None),
    };

    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidToken)?;
    let token = match auth_str.strip_prefix("Bearer ") {
        Some(token) => token,
        None => return Ok(None),
    };

    let claims = tokens.verify_access(token)?;

    let user_id = claims.user_id().ok_or(AuthError::InvalidToken)?;
    let session_id = claims.session_id().ok_or(AuthError::InvalidToken)?;

    Ok(Some(AuthenticatedUser {
        user_id,
        email: claims.email,
        role: claims.role,
        session_id,
        family_id: claims.fid,
    }))
}

/// Serialize an auth error as a JSON response
pub fn auth_error_response(error: AuthError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response = ErrorResponse::from(&error);

    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", "application/json");

    if let Some(retry_after) = response.retry_after {
        builder = builder.header("Retry-After", retry_after.to_string());
    }

    builder
        .body(Body::from(
            serde_json::to_string(&response).unwrap_or_default(),
        ))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::token::random_token;
    use chrono::Utc;
    use keygate_db::DbUser;
    use uuid::Uuid;

    fn service() -> TokenService {
        TokenService::new(JwtConfig {
            access_secret: "access-secret-key-at-least-32-bytes!".to_string(),
            refresh_secret: "refresh-secret-key-at-least-32-bytes".to_string(),
            ..Default::default()
        })
    }

    fn user() -> DbUser {
        DbUser {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            email_verified: true,
            password_hash: None,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            user_name: None,
            role: "ADMIN".to_string(),
            is_active: true,
            is_suspended: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_header_passes_through() {
        let headers = HeaderMap::new();
        let result = authenticate(&headers, &service()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_non_bearer_scheme_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        let result = authenticate(&headers, &service()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_valid_bearer_extracts_principal() {
        let tokens = service();
        let user = user();
        let session_id = Uuid::new_v4();
        let family_id = random_token();
        let pair = tokens.issue_pair(&user, session_id, &family_id).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", pair.access_token).parse().unwrap(),
        );

        let principal = authenticate(&headers, &tokens).unwrap().unwrap();
        assert_eq!(principal.user_id, user.id);
        assert_eq!(principal.session_id, session_id);
        assert_eq!(principal.family_id, family_id);
        assert!(principal.is_admin());
    }

    #[test]
    fn test_invalid_bearer_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer garbage".parse().unwrap());
        assert!(authenticate(&headers, &service()).is_err());
    }

    #[test]
    fn test_refresh_token_rejected_as_bearer() {
        let tokens = service();
        let pair = tokens
            .issue_pair(&user(), Uuid::new_v4(), &random_token())
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", pair.refresh_token).parse().unwrap(),
        );

        assert!(authenticate(&headers, &tokens).is_err());
    }
}
