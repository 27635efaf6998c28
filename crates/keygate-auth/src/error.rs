//! Authentication error types
//!
//! Errors are designed to be informative for logging, safe for external
//! exposure, and convertible to HTTP status codes at the API boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Token Errors
    // =========================================================================
    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// Token is invalid (malformed, bad signature, wrong issuer/audience)
    #[error("Invalid token")]
    InvalidToken,

    /// Token type mismatch (access presented as refresh or vice versa)
    #[error("Invalid token type")]
    InvalidTokenType,

    /// Refresh token is invalid, expired, rotated away, or reused
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// Uniform invalid-credential error. The message never distinguishes an
    /// unknown email from a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account is locked after too many failed logins
    #[error("Account is locked due to too many failed attempts. Try again in {remaining_minutes} minutes")]
    AccountLocked {
        /// Minutes until the lockout expires
        remaining_minutes: u64,
    },

    /// Current password re-verification failed
    #[error("Current password is incorrect")]
    CurrentPasswordMismatch,

    /// Password does not meet the policy
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    PasswordHashingFailed,

    // =========================================================================
    // Account State Errors
    // =========================================================================
    /// Email already registered
    #[error("Email is already registered")]
    EmailExists,

    /// User name already taken
    #[error("User name is already taken")]
    UserNameTaken,

    /// User account is deactivated
    #[error("Account is disabled")]
    AccountDisabled,

    /// User account is suspended
    #[error("Account is suspended")]
    AccountSuspended,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    // =========================================================================
    // Email Token Errors
    // =========================================================================
    /// Verification token unknown or malformed
    #[error("Invalid verification token")]
    InvalidVerificationToken,

    /// Verification token already consumed
    #[error("Email is already verified")]
    EmailAlreadyVerified,

    /// Verification token older than its acceptance window
    #[error("Verification token has expired")]
    VerificationTokenExpired,

    /// Reset token unknown, used, or expired
    #[error("Invalid or expired password reset token")]
    InvalidResetToken,

    // =========================================================================
    // OAuth Errors
    // =========================================================================
    /// State nonce absent, expired, or bound to a different provider
    #[error("Invalid or expired OAuth state parameter")]
    InvalidOAuthState,

    /// Provider rejected the code exchange or userinfo call
    #[error("OAuth provider error: {0}")]
    OAuthProviderError(String),

    /// Provider returned no usable email address
    #[error("OAuth provider did not supply an email address")]
    OAuthEmailMissing,

    /// Linking blocked because the local account's email is unverified
    #[error("Verify your email address before linking a sign-in provider")]
    OAuthLinkRequiresVerifiedEmail,

    /// Provider identity already linked to another user
    #[error("This {0} account is already linked to another user")]
    OAuthAccountTaken(String),

    /// Provider not linked to this user
    #[error("{0} is not linked to this account")]
    OAuthNotLinked(String),

    /// Refusing to remove the only way to sign in
    #[error("Cannot unlink the last remaining sign-in method")]
    LastAuthMethod,

    // =========================================================================
    // CSRF / Rate Limiting
    // =========================================================================
    /// CSRF token missing or unknown
    #[error("Invalid or missing CSRF token")]
    InvalidCsrfToken,

    /// Rate limit exceeded
    #[error("Rate limit exceeded, try again in {retry_after} seconds")]
    RateLimitExceeded {
        /// Seconds until the window resets
        retry_after: u64,
    },

    // =========================================================================
    // Permission Errors
    // =========================================================================
    /// No authenticated principal on the request
    #[error("Authentication required")]
    Unauthenticated,

    /// Principal lacks the required role
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// Session not found or not owned by the caller
    #[error("Session not found")]
    SessionNotFound,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Redis/cache error on an authoritative path
    #[error("Cache error: {0}")]
    Cache(String),

    /// Internal error (never exposed verbatim to clients)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::WeakPassword(_)
            | Self::InvalidTokenType
            | Self::InvalidVerificationToken
            | Self::EmailAlreadyVerified
            | Self::VerificationTokenExpired
            | Self::InvalidResetToken
            | Self::OAuthEmailMissing
            | Self::OAuthLinkRequiresVerifiedEmail
            | Self::LastAuthMethod => 400,

            Self::TokenExpired
            | Self::InvalidToken
            | Self::InvalidRefreshToken
            | Self::InvalidCredentials
            | Self::AccountLocked { .. }
            | Self::CurrentPasswordMismatch
            | Self::InvalidOAuthState
            | Self::OAuthProviderError(_)
            | Self::Unauthenticated => 401,

            Self::AccountDisabled | Self::AccountSuspended | Self::InvalidCsrfToken
            | Self::InsufficientPermissions => 403,

            Self::UserNotFound | Self::SessionNotFound | Self::OAuthNotLinked(_) => 404,

            Self::EmailExists | Self::UserNameTaken | Self::OAuthAccountTaken(_) => 409,

            Self::RateLimitExceeded { .. } => 429,

            Self::Database(_)
            | Self::Cache(_)
            | Self::PasswordHashingFailed
            | Self::Internal(_) => 500,
        }
    }

    /// Machine-readable error code, safe to expose
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidTokenType => "INVALID_TOKEN_TYPE",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::CurrentPasswordMismatch => "INVALID_CREDENTIALS",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::PasswordHashingFailed => "INTERNAL_ERROR",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::UserNameTaken => "USER_NAME_TAKEN",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::AccountSuspended => "ACCOUNT_SUSPENDED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidVerificationToken => "INVALID_VERIFICATION_TOKEN",
            Self::EmailAlreadyVerified => "EMAIL_ALREADY_VERIFIED",
            Self::VerificationTokenExpired => "VERIFICATION_TOKEN_EXPIRED",
            Self::InvalidResetToken => "INVALID_RESET_TOKEN",
            Self::InvalidOAuthState => "INVALID_OAUTH_STATE",
            Self::OAuthProviderError(_) => "OAUTH_PROVIDER_ERROR",
            Self::OAuthEmailMissing => "OAUTH_EMAIL_MISSING",
            Self::OAuthLinkRequiresVerifiedEmail => "OAUTH_EMAIL_UNVERIFIED",
            Self::OAuthAccountTaken(_) => "OAUTH_ACCOUNT_TAKEN",
            Self::OAuthNotLinked(_) => "OAUTH_NOT_LINKED",
            Self::LastAuthMethod => "LAST_AUTH_METHOD",
            Self::InvalidCsrfToken => "INVALID_CSRF_TOKEN",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::Database(_) | Self::Cache(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Safe message for clients; internal details never leak
    pub fn client_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Cache(_) | Self::Internal(_)
            | Self::PasswordHashingFailed => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// Error response body for API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (machine-readable)
    pub code: String,
    /// Error message (human-readable)
    pub message: String,
    /// Retry-after in seconds (rate limiting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        let retry_after = match error {
            AuthError::RateLimitExceeded { retry_after } => Some(*retry_after),
            AuthError::AccountLocked { remaining_minutes } => Some(remaining_minutes * 60),
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.client_message(),
            retry_after,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::InvalidToken,
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(_: argon2::password_hash::Error) -> Self {
        Self::PasswordHashingFailed
    }
}

impl From<keygate_db::DbError> for AuthError {
    fn from(err: keygate_db::DbError) -> Self {
        use keygate_db::DbError;
        match err {
            DbError::NotFound(msg) => Self::Internal(msg),
            DbError::Redis(msg) | DbError::Serialization(msg) => Self::Cache(msg),
            other => Self::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert_eq!(
            AuthError::AccountLocked {
                remaining_minutes: 30
            }
            .status_code(),
            401
        );
        assert_eq!(AuthError::InvalidCsrfToken.status_code(), 403);
        assert_eq!(AuthError::SessionNotFound.status_code(), 404);
        assert_eq!(AuthError::EmailExists.status_code(), 409);
        assert_eq!(
            AuthError::RateLimitExceeded { retry_after: 60 }.status_code(),
            429
        );
        assert_eq!(AuthError::Database("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_uniform_credential_message() {
        // The wrong-password and current-password errors share one code so
        // responses cannot be used to probe account existence.
        assert_eq!(AuthError::InvalidCredentials.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(
            AuthError::CurrentPasswordMismatch.error_code(),
            "INVALID_CREDENTIALS"
        );
    }

    #[test]
    fn test_locked_message_mentions_minutes() {
        let err = AuthError::AccountLocked {
            remaining_minutes: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("locked"));
        assert!(msg.contains("12 minutes"));
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = AuthError::Database("connection string with password".to_string());
        assert!(!err.client_message().contains("password"));
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_error_response_retry_after() {
        let err = AuthError::AccountLocked {
            remaining_minutes: 2,
        };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, "ACCOUNT_LOCKED");
        assert_eq!(response.retry_after, Some(120));
    }
}
