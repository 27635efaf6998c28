//! Cache-aside user reader
//!
//! Reads go through `user:{id}` with a 1 hour TTL; a miss falls through to
//! PostgreSQL and repopulates the cache. Every user mutation calls
//! `invalidate` before its caller returns success. The cache is
//! non-authoritative: any ephemeral failure degrades to a direct read.

use keygate_db::{Database, DbUser};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::AuthResult;

#[derive(Clone)]
pub struct UserReader {
    db: Arc<Database>,
}

impl UserReader {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Read-through lookup by id
    pub async fn get_user_by_id(&self, id: Uuid) -> AuthResult<Option<DbUser>> {
        let key = id.to_string();

        match self.db.cache().get_user::<DbUser>(&key).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "user cache read failed, falling through");
            }
        }

        let user = self.db.user_repo().find_by_id(id).await?;

        if let Some(user) = &user {
            if let Err(e) = self.db.cache().set_user(&key, user).await {
                warn!(error = %e, "user cache write failed");
            }
        }

        Ok(user)
    }

    /// Drop the cached entry. Runs before any mutation's caller returns so a
    /// stale role can never be served after a write.
    pub async fn invalidate(&self, id: Uuid) {
        if let Err(e) = self.db.cache().invalidate_user(&id.to_string()).await {
            warn!(error = %e, "user cache invalidation failed");
        }
    }
}
