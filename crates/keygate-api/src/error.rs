//! API error handling
//!
//! Engines throw typed `AuthError`s; this module maps them onto the HTTP
//! envelope `{status: "error", message, errors?}` with the right status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keygate_auth::AuthError;
use keygate_db::DbError;
use serde::Serialize;
use utoipa::ToSchema;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced at the HTTP boundary
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body or query; carries a per-field message list
    Validation(Vec<String>),
    /// Semantically invalid request
    BadRequest(String),
    /// Missing or invalid credentials
    Unauthorized(String),
    /// Authenticated but not allowed (CSRF, role)
    Forbidden(String),
    /// Unknown resource
    NotFound(String),
    /// Unique-constraint style conflicts
    Conflict(String),
    /// Rate limiter tripped
    TooManyRequests { retry_after: u64 },
    /// Everything else; message stays generic in responses
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(_) => "Validation failed".to_string(),
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::TooManyRequests { retry_after } => {
                format!("Rate limit exceeded, try again in {} seconds", retry_after)
            }
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    fn errors(&self) -> Option<Vec<String>> {
        match self {
            Self::Validation(errors) => Some(errors.clone()),
            _ => None,
        }
    }
}

/// Error envelope body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always "error"
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Per-field validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error");
        }

        let status = self.status_code();
        let body = ErrorBody {
            status: "error".to_string(),
            message: self.message(),
            errors: self.errors(),
        };

        let mut response = (status, Json(body)).into_response();

        if let Self::TooManyRequests { retry_after } = self {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.client_message();
        match err.status_code() {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            429 => {
                if let AuthError::RateLimitExceeded { retry_after } = err {
                    Self::TooManyRequests { retry_after }
                } else {
                    Self::TooManyRequests { retry_after: 60 }
                }
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(msg) => Self::Conflict(msg),
            DbError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_mapping() {
        let err: ApiError = AuthError::InvalidCredentials.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err: ApiError = AuthError::EmailExists.into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ApiError = AuthError::InvalidCsrfToken.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err: ApiError = AuthError::SessionNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = AuthError::RateLimitExceeded { retry_after: 30 }.into();
        assert!(matches!(err, ApiError::TooManyRequests { retry_after: 30 }));
    }

    #[test]
    fn test_internal_detail_hidden() {
        let err: ApiError = AuthError::Database("secret dsn".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("secret"));
    }

    #[test]
    fn test_db_error_mapping() {
        let err: ApiError = DbError::Duplicate("email".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ApiError = DbError::NotFound("row".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
