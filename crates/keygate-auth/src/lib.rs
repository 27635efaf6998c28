//! Keygate authentication engines
//!
//! Credentials in, short-lived bearer tokens out, with continuous
//! enforcement of freshness, revocation and abuse limits:
//!
//! - **Token service**: access + refresh JWTs signed with distinct secrets
//! - **Credential engine**: registration, login with lockout, password
//!   change/reset, email verification
//! - **Session engine**: refresh rotation with per-family reuse detection,
//!   session inventory and selective revocation
//! - **OAuth engine**: Google/GitHub authorization-code flow with CSRF-bound
//!   state and verified-email account linking
//! - **CSRF engine**: opaque single-store tokens for state-changing requests
//!
//! The durable store (PostgreSQL) owns identity, credentials, sessions and
//! consumable tokens; the ephemeral store (Redis) owns lockout counters,
//! family heads, nonces and session metadata.

pub mod config;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod events;
pub mod mailer;
pub mod middleware;
pub mod oauth;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod sweeper;
pub mod token;
pub mod types;
pub mod users;

pub use config::AuthConfig;
pub use credentials::{CredentialService, RegisterInput};
pub use csrf::CsrfService;
pub use error::{AuthError, AuthResult, ErrorResponse};
pub use events::{SecurityContext, SecurityEvent, SecurityEvents};
pub use mailer::{LogMailer, Mailer, SmtpConfig};
pub use middleware::{auth_error_response, AuthLayer, AuthMiddleware};
pub use oauth::{LinkedProvider, OAuthLogin, OAuthProvider, OAuthService};
pub use password::PasswordService;
pub use rate_limit::RateLimiter;
pub use session::SessionService;
pub use sweeper::spawn_sweeper;
pub use token::{random_token, TokenService};
pub use types::*;
pub use users::UserReader;

use keygate_db::Database;
use std::sync::Arc;

/// Aggregate of the engines, wired once at process start
pub struct AuthService {
    pub tokens: TokenService,
    pub password: PasswordService,
    pub credentials: CredentialService,
    pub sessions: Arc<SessionService>,
    pub oauth: OAuthService,
    pub csrf: CsrfService,
    pub users: UserReader,
    pub rate_limiter: RateLimiter,
    pub events: SecurityEvents,
    config: AuthConfig,
}

impl AuthService {
    /// Wire the engines against the shared store handles
    pub fn new(db: Arc<Database>, mailer: Arc<dyn Mailer>, config: AuthConfig) -> Self {
        let events = SecurityEvents::new();
        let tokens = TokenService::new(config.jwt.clone());
        let password = PasswordService::new(config.password.clone());
        let users = UserReader::new(db.clone());

        let sessions = Arc::new(SessionService::new(
            db.clone(),
            tokens.clone(),
            events.clone(),
        ));

        let credentials = CredentialService::new(
            db.clone(),
            password.clone(),
            sessions.clone(),
            users.clone(),
            mailer,
            events.clone(),
            config.clone(),
        );

        let oauth = OAuthService::new(
            db.clone(),
            sessions.clone(),
            events.clone(),
            config.oauth.clone(),
        );

        let csrf = CsrfService::new(db.clone());
        let rate_limiter = RateLimiter::new(db, config.rate_limit.clone());

        Self {
            tokens,
            password,
            credentials,
            sessions,
            oauth,
            csrf,
            users,
            rate_limiter,
            events,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Bearer-token layer for the Axum router
    pub fn layer(&self) -> AuthLayer {
        AuthLayer::new(Arc::new(self.tokens.clone()))
    }
}
