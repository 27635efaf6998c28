//! User repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{CreateUser, DbError, DbResult, DbUser};

/// User repository for identity and credential storage
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user. Duplicate email or user name maps to `DbError::Duplicate`.
    pub async fn create(&self, user: CreateUser) -> DbResult<DbUser> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, user_name, role, email_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING
                id, email, email_verified, password_hash, first_name, last_name,
                user_name, role, is_active, is_suspended, created_at, updated_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.user_name)
        .bind(&user.role)
        .bind(user.email_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("users_email_lower_key") => {
                        return DbError::Duplicate(format!("Email {} already exists", user.email));
                    }
                    Some("users_user_name_key") => {
                        return DbError::Duplicate("User name already taken".to_string());
                    }
                    _ => {}
                }
            }
            DbError::Postgres(e)
        })?;

        Ok(row)
    }

    /// Find user by ID
    pub async fn find_by_id(&self, id: Uuid) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(
            r#"
            SELECT
                id, email, email_verified, password_hash, first_name, last_name,
                user_name, role, is_active, is_suspended, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find user by email (case-insensitive)
    pub async fn find_by_email(&self, email: &str) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(
            r#"
            SELECT
                id, email, email_verified, password_hash, first_name, last_name,
                user_name, role, is_active, is_suspended, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Replace the stored password hash
    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> DbResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Mark the user's email address as verified
    pub async fn set_email_verified(&self, user_id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a user. Foreign keys cascade to sessions, OAuth accounts,
    /// verifications, resets and the profile row.
    pub async fn delete(&self, user_id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound("User not found".to_string()));
        }

        Ok(())
    }
}
