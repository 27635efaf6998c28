//! OAuth account link repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbOAuthAccount, DbResult};

pub struct OAuthAccountRepo {
    pool: PgPool,
}

impl OAuthAccountRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Link a provider identity to a local user.
    /// Duplicate `(provider, provider_id)` maps to `DbError::Duplicate`.
    pub async fn create(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_id: &str,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> DbResult<DbOAuthAccount> {
        let account = sqlx::query_as::<_, DbOAuthAccount>(
            r#"
            INSERT INTO oauth_accounts (user_id, provider, provider_id, access_token, refresh_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, provider, provider_id, access_token, refresh_token, created_at
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_id)
        .bind(access_token)
        .bind(refresh_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("oauth_accounts_provider_provider_id_key") {
                    return DbError::Duplicate(format!(
                        "{} account is already linked to another user",
                        provider
                    ));
                }
            }
            DbError::Postgres(e)
        })?;

        Ok(account)
    }

    /// Find a link by the provider's opaque id
    pub async fn find_by_provider_id(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> DbResult<Option<DbOAuthAccount>> {
        let account = sqlx::query_as::<_, DbOAuthAccount>(
            r#"
            SELECT id, user_id, provider, provider_id, access_token, refresh_token, created_at
            FROM oauth_accounts
            WHERE provider = $1 AND provider_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Find a user's link for a specific provider
    pub async fn find_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> DbResult<Option<DbOAuthAccount>> {
        let account = sqlx::query_as::<_, DbOAuthAccount>(
            r#"
            SELECT id, user_id, provider, provider_id, access_token, refresh_token, created_at
            FROM oauth_accounts
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// List a user's linked providers
    pub async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<DbOAuthAccount>> {
        let accounts = sqlx::query_as::<_, DbOAuthAccount>(
            r#"
            SELECT id, user_id, provider, provider_id, access_token, refresh_token, created_at
            FROM oauth_accounts
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Count a user's linked providers
    pub async fn count_for_user(&self, user_id: Uuid) -> DbResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM oauth_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Remove a provider link
    pub async fn delete(&self, user_id: Uuid, provider: &str) -> DbResult<()> {
        let result =
            sqlx::query("DELETE FROM oauth_accounts WHERE user_id = $1 AND provider = $2")
                .bind(user_id)
                .bind(provider)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("{} is not linked", provider)));
        }

        Ok(())
    }
}
