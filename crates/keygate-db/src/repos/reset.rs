//! Password reset token repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbPasswordReset, DbResult};

pub struct PasswordResetRepo {
    pool: PgPool,
}

impl PasswordResetRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<DbPasswordReset> {
        let row = sqlx::query_as::<_, DbPasswordReset>(
            r#"
            INSERT INTO password_resets (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, used, used_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("password_resets_token_key") {
                    return DbError::Duplicate("Reset token collision".to_string());
                }
            }
            DbError::Postgres(e)
        })?;

        Ok(row)
    }

    pub async fn find_by_token(&self, token: &str) -> DbResult<Option<DbPasswordReset>> {
        let row = sqlx::query_as::<_, DbPasswordReset>(
            r#"
            SELECT id, user_id, token, expires_at, used, used_at, created_at
            FROM password_resets
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn mark_used(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE password_resets SET used = TRUE, used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clean up expired reset tokens
    pub async fn delete_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM password_resets WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
