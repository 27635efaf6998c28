//! Email verification token repository
//!
//! Rows are never swept; expiry is computed from `created_at` at check time
//! and consumed rows remain for audit.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbEmailVerification, DbError, DbResult};

pub struct EmailVerificationRepo {
    pool: PgPool,
}

impl EmailVerificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: Uuid, token: &str) -> DbResult<DbEmailVerification> {
        let row = sqlx::query_as::<_, DbEmailVerification>(
            r#"
            INSERT INTO email_verifications (user_id, token)
            VALUES ($1, $2)
            RETURNING id, user_id, token, verified, verified_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("email_verifications_token_key") {
                    return DbError::Duplicate("Verification token collision".to_string());
                }
            }
            DbError::Postgres(e)
        })?;

        Ok(row)
    }

    pub async fn find_by_token(&self, token: &str) -> DbResult<Option<DbEmailVerification>> {
        let row = sqlx::query_as::<_, DbEmailVerification>(
            r#"
            SELECT id, user_id, token, verified, verified_at, created_at
            FROM email_verifications
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn mark_verified(&self, id: Uuid) -> DbResult<()> {
        sqlx::query(
            "UPDATE email_verifications SET verified = TRUE, verified_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
