//! Credential engine
//!
//! Registration, login with account lockout, password change/reset, and
//! email verification. The lockout record lives in the ephemeral store keyed
//! by email; a locked record short-circuits login before the durable store is
//! touched. Lockout lookups fail open on a cache outage: the durable
//! credential check still gates access, only the counter is lost.

use chrono::{Duration as ChronoDuration, Utc};
use keygate_db::{CreateUser, Database, DbUser};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::events::{SecurityContext, SecurityEvent, SecurityEvents};
use crate::mailer::Mailer;
use crate::password::PasswordService;
use crate::session::SessionService;
use crate::token::random_token;
use crate::types::{LockoutRecord, LoginMethod, TokenPair, UserRole};
use crate::users::UserReader;

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub user_name: Option<String>,
}

#[derive(Clone)]
pub struct CredentialService {
    db: Arc<Database>,
    password: PasswordService,
    sessions: Arc<SessionService>,
    users: UserReader,
    mailer: Arc<dyn Mailer>,
    events: SecurityEvents,
    config: AuthConfig,
}

impl CredentialService {
    pub fn new(
        db: Arc<Database>,
        password: PasswordService,
        sessions: Arc<SessionService>,
        users: UserReader,
        mailer: Arc<dyn Mailer>,
        events: SecurityEvents,
        config: AuthConfig,
    ) -> Self {
        Self {
            db,
            password,
            sessions,
            users,
            mailer,
            events,
            config,
        }
    }

    /// Register a new user and mint their first session
    pub async fn register(
        &self,
        input: RegisterInput,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<(DbUser, TokenPair)> {
        let password_hash = self.password.hash_password(&input.password)?;

        let user = match self
            .db
            .user_repo()
            .create(CreateUser {
                email: input.email.clone(),
                password_hash: Some(password_hash),
                first_name: input.first_name,
                last_name: input.last_name,
                user_name: input.user_name,
                role: UserRole::User.as_str().to_string(),
                email_verified: false,
            })
            .await
        {
            Ok(user) => user,
            Err(keygate_db::DbError::Duplicate(msg)) => {
                if msg.contains("User name") {
                    return Err(AuthError::UserNameTaken);
                }
                return Err(AuthError::EmailExists);
            }
            Err(e) => return Err(e.into()),
        };

        self.send_verification_email(&user).await;

        let pair = self
            .sessions
            .issue_for_user(&user, ip.clone(), user_agent.clone(), LoginMethod::Password)
            .await?;

        self.events.emit(
            SecurityEvent::RegisterSuccess,
            SecurityContext::new()
                .user(user.id)
                .email(&user.email)
                .transport(ip, user_agent),
        );

        Ok((user, pair))
    }

    /// Authenticate with email and password.
    ///
    /// A live lockout record fails the attempt without consulting the
    /// database. Absent user, absent hash, and wrong password all produce the
    /// same uniform error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<(DbUser, TokenPair)> {
        let lockout = self.read_lockout(email).await;
        let now = Utc::now();

        if let Some(record) = &lockout {
            if record.is_locked(now) {
                return Err(AuthError::AccountLocked {
                    remaining_minutes: record.remaining_minutes(now),
                });
            }
        }

        let user = match self.db.user_repo().find_by_email(email).await? {
            Some(user) => user,
            None => {
                self.handle_failed_login(email, ip, user_agent).await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        let hash = match &user.password_hash {
            Some(hash) => hash.clone(),
            None => {
                // OAuth-only account; indistinguishable from a bad password.
                self.handle_failed_login(email, ip, user_agent).await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.password.verify_password(password, &hash)? {
            self.handle_failed_login(email, ip, user_agent).await;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        if user.is_suspended {
            return Err(AuthError::AccountSuspended);
        }

        if lockout.is_some() {
            if let Err(e) = self.db.cache().clear_login_attempts(email).await {
                warn!(error = %e, "failed to clear login attempts");
            }
            if lockout.map(|r| r.locked_until.is_some()).unwrap_or(false) {
                self.events.emit(
                    SecurityEvent::AccountUnlocked,
                    SecurityContext::new().user(user.id).email(email),
                );
            }
        }

        let pair = self
            .sessions
            .issue_for_user(&user, ip.clone(), user_agent.clone(), LoginMethod::Password)
            .await?;

        self.events.emit(
            SecurityEvent::LoginSuccess,
            SecurityContext::new()
                .user(user.id)
                .email(&user.email)
                .transport(ip, user_agent),
        );

        Ok((user, pair))
    }

    /// Record a failed login attempt and lock the account at the threshold.
    /// Never fails: a cache outage only loses the counter.
    pub async fn handle_failed_login(
        &self,
        email: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) {
        let attempts = match self.db.cache().incr_login_attempts(email).await {
            Ok(count) => count as u32,
            Err(e) => {
                warn!(error = %e, "failed to increment login attempts");
                self.events.emit(
                    SecurityEvent::LoginFailed,
                    SecurityContext::new()
                        .email(email)
                        .transport(ip, user_agent),
                );
                return;
            }
        };

        if attempts >= self.config.lockout.max_attempts {
            let record = LockoutRecord {
                attempts,
                locked_until: Some(
                    Utc::now()
                        + ChronoDuration::from_std(self.config.lockout.lockout_duration)
                            .unwrap_or_else(|_| ChronoDuration::minutes(30)),
                ),
            };
            if let Err(e) = self
                .db
                .cache()
                .set_lockout(email, &record, self.config.lockout.lockout_duration)
                .await
            {
                warn!(error = %e, "failed to write lockout record");
            }

            self.events.emit(
                SecurityEvent::AccountLocked,
                SecurityContext::new().email(email).transport(ip, user_agent),
            );
        } else {
            self.events.emit(
                SecurityEvent::LoginFailed,
                SecurityContext::new().email(email).transport(ip, user_agent),
            );
        }
    }

    /// Request a password reset. Always succeeds so responses cannot be used
    /// to enumerate accounts.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let user = match self.db.user_repo().find_by_email(email).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "password reset lookup failed");
                return Ok(());
            }
        };

        let token = random_token();
        let expires_at = Utc::now()
            + ChronoDuration::from_std(self.config.email_tokens.reset_lifetime)
                .unwrap_or_else(|_| ChronoDuration::hours(1));

        self.db
            .reset_repo()
            .create(user.id, &token, expires_at)
            .await?;

        if let Err(e) = self.mailer.send_password_reset(&user.email, &token).await {
            warn!(error = %e, "failed to send password reset email");
        }

        self.events.emit(
            SecurityEvent::PasswordResetRequested,
            SecurityContext::new().user(user.id).email(&user.email),
        );

        Ok(())
    }

    /// Consume a reset token: set the new password, mark the token used, and
    /// force a global logout.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let reset = self
            .db
            .reset_repo()
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        if reset.used || reset.expires_at <= Utc::now() {
            return Err(AuthError::InvalidResetToken);
        }

        let hash = self.password.hash_password(new_password)?;

        self.db
            .user_repo()
            .update_password(reset.user_id, &hash)
            .await?;
        self.users.invalidate(reset.user_id).await;

        self.db.reset_repo().mark_used(reset.id).await?;

        self.sessions.purge_user_sessions(reset.user_id).await?;

        self.events.emit(
            SecurityEvent::PasswordResetSuccess,
            SecurityContext::new().user(reset.user_id),
        );

        Ok(())
    }

    /// Change the password of an authenticated user after re-verifying the
    /// current one, then force a global logout.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .db
            .user_repo()
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::CurrentPasswordMismatch)?;

        if !self.password.verify_password(current_password, hash)? {
            return Err(AuthError::CurrentPasswordMismatch);
        }

        let new_hash = self.password.hash_password(new_password)?;

        self.db.user_repo().update_password(user.id, &new_hash).await?;
        self.users.invalidate(user.id).await;

        self.sessions.purge_user_sessions(user.id).await?;

        self.events.emit(
            SecurityEvent::PasswordChanged,
            SecurityContext::new().user(user.id).email(&user.email),
        );

        Ok(())
    }

    /// Consume an email verification token.
    pub async fn verify_email(&self, token: &str) -> AuthResult<()> {
        let verification = self
            .db
            .verification_repo()
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidVerificationToken)?;

        if verification.verified {
            return Err(AuthError::EmailAlreadyVerified);
        }

        let max_age = ChronoDuration::from_std(self.config.email_tokens.verification_lifetime)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        if Utc::now() - verification.created_at > max_age {
            return Err(AuthError::VerificationTokenExpired);
        }

        self.db
            .verification_repo()
            .mark_verified(verification.id)
            .await?;
        self.db
            .user_repo()
            .set_email_verified(verification.user_id)
            .await?;
        self.users.invalidate(verification.user_id).await;

        self.events.emit(
            SecurityEvent::EmailVerified,
            SecurityContext::new().user(verification.user_id),
        );

        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    async fn read_lockout(&self, email: &str) -> Option<LockoutRecord> {
        match self.db.cache().get_login_attempts_raw(email).await {
            Ok(Some(raw)) => LockoutRecord::parse(&raw),
            Ok(None) => None,
            Err(e) => {
                // Fail open: skip the lockout check rather than block logins
                // on a cache outage.
                warn!(error = %e, "lockout lookup failed, skipping check");
                None
            }
        }
    }

    async fn send_verification_email(&self, user: &DbUser) {
        let token = random_token();

        if let Err(e) = self.db.verification_repo().create(user.id, &token).await {
            warn!(error = %e, "failed to create email verification row");
            return;
        }

        if let Err(e) = self.mailer.send_verification(&user.email, &token).await {
            warn!(error = %e, "failed to send verification email");
        }

        self.events.emit(
            SecurityEvent::EmailVerificationSent,
            SecurityContext::new().user(user.id).email(&user.email),
        );
    }
}
