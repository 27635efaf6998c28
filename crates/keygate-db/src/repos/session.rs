//! Session repository
//!
//! Exactly one row per outstanding refresh token; the unique constraint on
//! `token` is the serialization point for concurrent rotations of the same
//! family.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult, DbSession};

pub struct SessionRepo {
    pool: PgPool,
}

impl SessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a session row with a caller-chosen id (the JWT `sid` claim).
    pub async fn create(
        &self,
        id: Uuid,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbSession> {
        let session = sqlx::query_as::<_, DbSession>(
            r#"
            INSERT INTO sessions (id, user_id, token, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token, expires_at, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("sessions_token_key") {
                    return DbError::Duplicate("Refresh token already in use".to_string());
                }
            }
            DbError::Postgres(e)
        })?;

        Ok(session)
    }

    /// Find a session by the exact refresh-token string
    pub async fn find_by_token(&self, token: &str) -> DbResult<Option<DbSession>> {
        let session = sqlx::query_as::<_, DbSession>(
            "SELECT id, user_id, token, expires_at, created_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// List every session row for a user, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<DbSession>> {
        let sessions = sqlx::query_as::<_, DbSession>(
            r#"
            SELECT id, user_id, token, expires_at, created_at
            FROM sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Delete a session row by id. Returns true if a row was removed.
    pub async fn delete_by_id(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session row by token. Idempotent; unknown token is not an error.
    pub async fn delete_by_token(&self, token: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session that must belong to the given user
    pub async fn delete_for_user(&self, session_id: Uuid, user_id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound("Session not found".to_string()));
        }

        Ok(())
    }

    /// Delete every session for a user except the given one. Returns the ids
    /// of the removed rows so ephemeral metadata can be cleaned up too.
    pub async fn delete_others_for_user(
        &self,
        user_id: Uuid,
        keep_session_id: Uuid,
    ) -> DbResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "DELETE FROM sessions WHERE user_id = $1 AND id <> $2 RETURNING id",
        )
        .bind(user_id)
        .bind(keep_session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete all sessions for a user (forced global logout)
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Clean up expired sessions
    pub async fn delete_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
