//! User profile repository
//!
//! The profile row is an optional 1:1 extension of the user, created lazily
//! on the first profile write.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbResult, DbUserProfile};

/// Profile fields for an upsert; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UpsertProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
}

pub struct ProfileRepo {
    pool: PgPool,
}

impl ProfileRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> DbResult<Option<DbUserProfile>> {
        let profile = sqlx::query_as::<_, DbUserProfile>(
            r#"
            SELECT user_id, display_name, bio, avatar_url, website, location, created_at, updated_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Create the row on first write, otherwise patch the provided fields.
    pub async fn upsert(&self, user_id: Uuid, profile: UpsertProfile) -> DbResult<DbUserProfile> {
        let row = sqlx::query_as::<_, DbUserProfile>(
            r#"
            INSERT INTO user_profiles (user_id, display_name, bio, avatar_url, website, location)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, user_profiles.display_name),
                bio          = COALESCE(EXCLUDED.bio, user_profiles.bio),
                avatar_url   = COALESCE(EXCLUDED.avatar_url, user_profiles.avatar_url),
                website      = COALESCE(EXCLUDED.website, user_profiles.website),
                location     = COALESCE(EXCLUDED.location, user_profiles.location),
                updated_at   = NOW()
            RETURNING user_id, display_name, bio, avatar_url, website, location, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&profile.display_name)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .bind(&profile.website)
        .bind(&profile.location)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
