//! Security event emitter
//!
//! Structured sink for authentication lifecycle events. Emission is
//! synchronous and best-effort; it can never fail the calling operation.
//! Events land on the `keygate::security` tracing target so operators can
//! route them separately from application logs.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Enumerated security events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEvent {
    LoginSuccess,
    LoginFailed,
    RegisterSuccess,
    AccountLocked,
    AccountUnlocked,
    TokenRefreshSuccess,
    TokenRefreshFailed,
    TokenReuseDetected,
    PasswordResetRequested,
    PasswordResetSuccess,
    PasswordChanged,
    OauthLoginSuccess,
    OauthLoginFailed,
    SessionCreated,
    SessionRevoked,
    EmailVerificationSent,
    EmailVerified,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::RegisterSuccess => "REGISTER_SUCCESS",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountUnlocked => "ACCOUNT_UNLOCKED",
            Self::TokenRefreshSuccess => "TOKEN_REFRESH_SUCCESS",
            Self::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            Self::TokenReuseDetected => "TOKEN_REUSE_DETECTED",
            Self::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            Self::PasswordResetSuccess => "PASSWORD_RESET_SUCCESS",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::OauthLoginSuccess => "OAUTH_LOGIN_SUCCESS",
            Self::OauthLoginFailed => "OAUTH_LOGIN_FAILED",
            Self::SessionCreated => "SESSION_CREATED",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::EmailVerificationSent => "EMAIL_VERIFICATION_SENT",
            Self::EmailVerified => "EMAIL_VERIFIED",
        }
    }
}

impl std::fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional context attached to an event
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<Uuid>,
    pub provider: Option<String>,
    pub error: Option<String>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn transport(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }

    pub fn session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Event emitter handle
#[derive(Debug, Clone, Default)]
pub struct SecurityEvents;

impl SecurityEvents {
    pub fn new() -> Self {
        Self
    }

    /// Emit one event. Synchronous; never fails the caller.
    pub fn emit(&self, event: SecurityEvent, ctx: SecurityContext) {
        tracing::info!(
            target: "keygate::security",
            event = %event,
            timestamp = %Utc::now().to_rfc3339(),
            user_id = ?ctx.user_id,
            email = ?ctx.email,
            ip = ?ctx.ip,
            user_agent = ?ctx.user_agent,
            session_id = ?ctx.session_id,
            provider = ?ctx.provider,
            error = ?ctx.error,
            "security event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(SecurityEvent::LoginSuccess.as_str(), "LOGIN_SUCCESS");
        assert_eq!(
            SecurityEvent::TokenReuseDetected.to_string(),
            "TOKEN_REUSE_DETECTED"
        );
    }

    #[test]
    fn test_emit_never_panics() {
        let events = SecurityEvents::new();
        events.emit(
            SecurityEvent::LoginFailed,
            SecurityContext::new()
                .email("test@example.com")
                .error("bad password"),
        );
        events.emit(SecurityEvent::SessionCreated, SecurityContext::new());
    }
}
