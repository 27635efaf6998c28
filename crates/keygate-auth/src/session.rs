//! Session and refresh-rotation engine
//!
//! A token family is a chain of refresh tokens sharing one family id; at any
//! moment exactly one member is the head, tracked at `token_family:{id}` in
//! the ephemeral store. Presenting a non-head member of a family whose head
//! still exists is reuse. A family whose head entry is gone falls back to the
//! durable session row, so an ephemeral-store outage degrades to
//! rotation-without-reuse-detection instead of forcing logouts.

use chrono::{Duration as ChronoDuration, Utc};
use keygate_db::{Database, DbSession, DbUser};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::events::{SecurityContext, SecurityEvent, SecurityEvents};
use crate::token::{random_token, TokenService};
use crate::types::{FamilyHead, LoginMethod, SessionMeta, SessionView, TokenPair};

#[derive(Clone)]
pub struct SessionService {
    db: Arc<Database>,
    tokens: TokenService,
    events: SecurityEvents,
}

impl SessionService {
    pub fn new(db: Arc<Database>, tokens: TokenService, events: SecurityEvents) -> Self {
        Self { db, tokens, events }
    }

    /// Mint a session for a freshly authenticated user: new session id, new
    /// token family, family head written before the session row is inserted.
    pub async fn issue_for_user(
        &self,
        user: &DbUser,
        ip: Option<String>,
        user_agent: Option<String>,
        method: LoginMethod,
    ) -> AuthResult<TokenPair> {
        let session_id = Uuid::new_v4();
        let family_id = random_token();

        let pair = self.tokens.issue_pair(user, session_id, &family_id)?;

        self.write_family_head(&family_id, &pair.refresh_token, user.id)
            .await;

        self.create_session(user.id, &pair.refresh_token, session_id)
            .await
            .map_err(AuthError::from)?;

        let now = Utc::now();
        self.write_session_meta(
            session_id,
            &SessionMeta {
                ip: ip.clone(),
                user_agent: user_agent.clone(),
                last_used_at: now,
                last_login_at: now,
                login_method: method.as_str().to_string(),
            },
        )
        .await;

        self.events.emit(
            SecurityEvent::SessionCreated,
            SecurityContext::new()
                .user(user.id)
                .email(&user.email)
                .session(session_id)
                .transport(ip, user_agent),
        );

        Ok(pair)
    }

    /// Rotate a refresh token.
    ///
    /// Order matters: signature, family-head reuse check, durable row lookup,
    /// expiry, user load, then head update before the row swap. The unique
    /// token constraint on the session table serializes concurrent rotations
    /// of the same family; the loser surfaces as Unauthorized.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = match self.tokens.verify_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                self.events.emit(
                    SecurityEvent::TokenRefreshFailed,
                    SecurityContext::new().error(e.to_string()),
                );
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        match self
            .db
            .cache()
            .get_token_family::<FamilyHead>(&claims.fid)
            .await
        {
            Ok(Some(head)) if head.current_token != refresh_token => {
                return self.handle_reuse(&claims.fid, head).await;
            }
            Ok(_) => {}
            Err(e) => {
                // Absent head is acceptable (invariant: the session row still
                // gates the rotation), so a cache outage only disables reuse
                // detection for this call.
                warn!(error = %e, "family head lookup failed, continuing without reuse check");
            }
        }

        let session = match self.db.session_repo().find_by_token(refresh_token).await? {
            Some(session) => session,
            None => {
                self.events.emit(
                    SecurityEvent::TokenRefreshFailed,
                    SecurityContext::new().error("no session row for refresh token"),
                );
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        if session.expires_at <= Utc::now() {
            let _ = self.db.session_repo().delete_by_id(session.id).await;
            self.delete_session_meta(session.id).await;
            self.events.emit(
                SecurityEvent::TokenRefreshFailed,
                SecurityContext::new()
                    .user(session.user_id)
                    .error("session expired"),
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .db
            .user_repo()
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        if user.is_suspended {
            return Err(AuthError::AccountSuspended);
        }

        // Same family, fresh session identity.
        let new_session_id = Uuid::new_v4();
        let pair = self.tokens.issue_pair(&user, new_session_id, &claims.fid)?;

        self.write_family_head(&claims.fid, &pair.refresh_token, user.id)
            .await;

        let old_meta = self.read_session_meta(session.id).await;
        let _ = self.db.session_repo().delete_by_id(session.id).await;
        self.delete_session_meta(session.id).await;

        match self
            .create_session(user.id, &pair.refresh_token, new_session_id)
            .await
        {
            Ok(()) => {}
            Err(keygate_db::DbError::Duplicate(_)) => {
                // A concurrent rotation committed first.
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => return Err(e.into()),
        }

        let now = Utc::now();
        let meta = match old_meta {
            Some(old) => SessionMeta {
                last_used_at: now,
                ..old
            },
            None => SessionMeta {
                ip: None,
                user_agent: None,
                last_used_at: now,
                last_login_at: now,
                login_method: LoginMethod::Password.as_str().to_string(),
            },
        };
        self.write_session_meta(new_session_id, &meta).await;

        self.events.emit(
            SecurityEvent::TokenRefreshSuccess,
            SecurityContext::new()
                .user(user.id)
                .email(&user.email)
                .session(new_session_id),
        );

        Ok(pair)
    }

    /// Best-effort logout. Unknown tokens succeed.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        match self.db.session_repo().find_by_token(refresh_token).await {
            Ok(Some(session)) => {
                let _ = self.db.session_repo().delete_by_id(session.id).await;
                self.delete_session_meta(session.id).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "logout lookup failed");
            }
        }
        Ok(())
    }

    /// Session inventory: every row for the user merged with its metadata.
    /// Missing metadata nulls out the transport fields.
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        current_session_id: Uuid,
    ) -> AuthResult<Vec<SessionView>> {
        let rows = self.db.session_repo().list_for_user(user_id).await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let meta = self.read_session_meta(row.id).await;
            views.push(session_view(&row, meta, current_session_id));
        }

        Ok(views)
    }

    /// Revoke one session that must belong to the caller
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> AuthResult<()> {
        self.db
            .session_repo()
            .delete_for_user(session_id, user_id)
            .await
            .map_err(|e| match e {
                keygate_db::DbError::NotFound(_) => AuthError::SessionNotFound,
                other => other.into(),
            })?;

        self.delete_session_meta(session_id).await;

        self.events.emit(
            SecurityEvent::SessionRevoked,
            SecurityContext::new().user(user_id).session(session_id),
        );

        Ok(())
    }

    /// Revoke every session for the user except the current one
    pub async fn revoke_other_sessions(
        &self,
        user_id: Uuid,
        current_session_id: Uuid,
    ) -> AuthResult<u64> {
        let removed = self
            .db
            .session_repo()
            .delete_others_for_user(user_id, current_session_id)
            .await?;

        for session_id in &removed {
            self.delete_session_meta(*session_id).await;
            self.events.emit(
                SecurityEvent::SessionRevoked,
                SecurityContext::new().user(user_id).session(*session_id),
            );
        }

        Ok(removed.len() as u64)
    }

    /// Unconditionally delete every session for the user (password change or
    /// reset, or reuse containment) including ephemeral metadata.
    pub async fn purge_user_sessions(&self, user_id: Uuid) -> AuthResult<u64> {
        let rows = self.db.session_repo().list_for_user(user_id).await?;
        for row in &rows {
            self.delete_session_meta(row.id).await;
        }

        let count = self.db.session_repo().delete_all_for_user(user_id).await?;
        Ok(count)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    async fn handle_reuse(&self, family_id: &str, head: FamilyHead) -> AuthResult<TokenPair> {
        if let Err(e) = self.db.cache().delete_token_family(family_id).await {
            warn!(error = %e, "failed to delete family head after reuse");
        }

        // A replayed member of a live family means the token chain leaked;
        // every descendant session is suspect.
        match self.purge_user_sessions(head.user_id).await {
            Ok(count) => {
                warn!(
                    user_id = %head.user_id,
                    purged_sessions = count,
                    "refresh token reuse detected, sessions purged"
                );
            }
            Err(e) => {
                warn!(error = %e, "failed to purge sessions after reuse");
            }
        }

        self.events.emit(
            SecurityEvent::TokenReuseDetected,
            SecurityContext::new().user(head.user_id),
        );

        Err(AuthError::InvalidRefreshToken)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        session_id: Uuid,
    ) -> Result<(), keygate_db::DbError> {
        let expires_at = Utc::now()
            + ChronoDuration::from_std(self.tokens.refresh_lifetime())
                .unwrap_or_else(|_| ChronoDuration::days(7));

        self.db
            .session_repo()
            .create(session_id, user_id, refresh_token, expires_at)
            .await?;

        Ok(())
    }

    async fn write_family_head(&self, family_id: &str, refresh_token: &str, user_id: Uuid) {
        let head = FamilyHead {
            current_token: refresh_token.to_string(),
            user_id,
        };
        if let Err(e) = self
            .db
            .cache()
            .set_token_family(family_id, &head, self.tokens.refresh_lifetime())
            .await
        {
            warn!(error = %e, "failed to write token family head");
        }
    }

    async fn write_session_meta(&self, session_id: Uuid, meta: &SessionMeta) {
        if let Err(e) = self
            .db
            .cache()
            .set_session_meta(
                &session_id.to_string(),
                meta,
                self.tokens.refresh_lifetime(),
            )
            .await
        {
            warn!(error = %e, "failed to write session metadata");
        }
    }

    async fn read_session_meta(&self, session_id: Uuid) -> Option<SessionMeta> {
        match self
            .db
            .cache()
            .get_session_meta::<SessionMeta>(&session_id.to_string())
            .await
        {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = %e, "failed to read session metadata");
                None
            }
        }
    }

    async fn delete_session_meta(&self, session_id: Uuid) {
        if let Err(e) = self
            .db
            .cache()
            .delete_session_meta(&session_id.to_string())
            .await
        {
            warn!(error = %e, "failed to delete session metadata");
        }
    }
}

fn session_view(
    row: &DbSession,
    meta: Option<SessionMeta>,
    current_session_id: Uuid,
) -> SessionView {
    let is_current = row.id == current_session_id;
    match meta {
        Some(meta) => SessionView {
            id: row.id,
            ip: meta.ip,
            user_agent: meta.user_agent,
            last_used_at: Some(meta.last_used_at),
            last_login_at: Some(meta.last_login_at),
            login_method: Some(meta.login_method),
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_current,
        },
        None => SessionView {
            id: row.id,
            ip: None,
            user_agent: None,
            last_used_at: None,
            last_login_at: None,
            login_method: None,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_current,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_row(id: Uuid) -> DbSession {
        DbSession {
            id,
            user_id: Uuid::new_v4(),
            token: "refresh-token".to_string(),
            expires_at: Utc::now() + ChronoDuration::days(7),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_view_with_meta() {
        let id = Uuid::new_v4();
        let row = session_row(id);
        let now = Utc::now();
        let meta = SessionMeta {
            ip: Some("203.0.113.9".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            last_used_at: now,
            last_login_at: now,
            login_method: "password".to_string(),
        };

        let view = session_view(&row, Some(meta), id);
        assert!(view.is_current);
        assert_eq!(view.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(view.login_method.as_deref(), Some("password"));
    }

    #[test]
    fn test_session_view_without_meta() {
        let row = session_row(Uuid::new_v4());
        let view = session_view(&row, None, Uuid::new_v4());
        assert!(!view.is_current);
        assert!(view.ip.is_none());
        assert!(view.last_used_at.is_none());
        assert!(view.login_method.is_none());
    }
}
