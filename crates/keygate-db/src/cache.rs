//! Redis cache manager for lockout counters, token-family heads, CSRF and
//! OAuth-state nonces, session metadata and the user read cache.
//!
//! The durable store stays authoritative for identity and sessions; keys here
//! are either pure accelerators (user cache) or own short-lived coordination
//! state (lockout, family heads, nonces). Callers on the durable path treat
//! failures as warnings, not errors.

use deadpool_redis::{redis::AsyncCommands, Pool as RedisPool};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::DbResult;

/// Cache key prefixes
pub mod keys {
    pub const USER: &str = "user:";
    pub const LOGIN_ATTEMPTS: &str = "login_attempts:";
    pub const TOKEN_FAMILY: &str = "token_family:";
    pub const SESSION_META: &str = "session_meta:";
    pub const CSRF: &str = "csrf:";
    pub const OAUTH_STATE: &str = "oauth:state:";
    pub const RATE_LIMIT: &str = "rate:";
}

/// Default TTLs
pub mod ttl {
    use std::time::Duration;

    pub const USER: Duration = Duration::from_secs(60 * 60); // 1 hour
    pub const LOGIN_ATTEMPTS: Duration = Duration::from_secs(60 * 60); // 1 hour
    pub const LOCKOUT: Duration = Duration::from_secs(30 * 60); // 30 minutes
    pub const TOKEN_FAMILY: Duration = Duration::from_secs(7 * 24 * 60 * 60); // 7 days
    pub const SESSION_META: Duration = Duration::from_secs(7 * 24 * 60 * 60); // 7 days
    pub const CSRF: Duration = Duration::from_secs(24 * 60 * 60); // 24 hours
    pub const OAUTH_STATE: Duration = Duration::from_secs(10 * 60); // 10 minutes
}

pub struct CacheManager {
    pool: RedisPool,
}

impl CacheManager {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Basic Operations
    // =========================================================================

    /// Set a JSON value with expiration
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> DbResult<()> {
        let mut conn = self.pool.get().await?;

        let json = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, json, ttl.as_secs()).await?;

        Ok(())
    }

    /// Get a JSON value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let mut conn = self.pool.get().await?;

        let result: Option<String> = conn.get(key).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Get the raw string value of a key
    pub async fn get_raw(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let result: Option<String> = conn.get(key).await?;
        Ok(result)
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let deleted: i32 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    /// Check if a key exists
    pub async fn exists(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    /// Atomically get and delete a key (single-use consumption)
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let mut conn = self.pool.get().await?;

        let result: Option<String> = deadpool_redis::redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Atomically increment a counter, setting the TTL when the key is new.
    /// Returns the post-increment count.
    pub async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> DbResult<i64> {
        let mut conn = self.pool.get().await?;

        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        }

        Ok(count)
    }

    /// Delete keys matching a pattern. Returns the number removed.
    pub async fn delete_pattern(&self, pattern: &str) -> DbResult<u64> {
        let mut conn = self.pool.get().await?;

        let keys: Vec<String> = deadpool_redis::redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: i64 = conn.del(&keys).await?;
        Ok(deleted as u64)
    }

    /// Connectivity probe
    pub async fn ping(&self) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    // =========================================================================
    // User Read Cache
    // =========================================================================

    pub async fn set_user<T: Serialize>(&self, user_id: &str, user: &T) -> DbResult<()> {
        let key = format!("{}{}", keys::USER, user_id);
        self.set(&key, user, ttl::USER).await
    }

    pub async fn get_user<T: DeserializeOwned>(&self, user_id: &str) -> DbResult<Option<T>> {
        let key = format!("{}{}", keys::USER, user_id);
        self.get(&key).await
    }

    pub async fn invalidate_user(&self, user_id: &str) -> DbResult<bool> {
        let key = format!("{}{}", keys::USER, user_id);
        self.delete(&key).await
    }

    // =========================================================================
    // Login Attempts / Lockout
    // =========================================================================
    //
    // While counting, the key holds a bare integer so INCR stays atomic.
    // Once the threshold is hit the key is overwritten with a JSON lockout
    // record carrying `locked_until`. Readers accept both encodings.

    pub async fn incr_login_attempts(&self, email: &str) -> DbResult<i64> {
        let key = format!("{}{}", keys::LOGIN_ATTEMPTS, email);
        self.incr_with_ttl(&key, ttl::LOGIN_ATTEMPTS).await
    }

    pub async fn set_lockout<T: Serialize>(
        &self,
        email: &str,
        record: &T,
        ttl: Duration,
    ) -> DbResult<()> {
        let key = format!("{}{}", keys::LOGIN_ATTEMPTS, email);
        self.set(&key, record, ttl).await
    }

    pub async fn get_login_attempts_raw(&self, email: &str) -> DbResult<Option<String>> {
        let key = format!("{}{}", keys::LOGIN_ATTEMPTS, email);
        self.get_raw(&key).await
    }

    pub async fn clear_login_attempts(&self, email: &str) -> DbResult<bool> {
        let key = format!("{}{}", keys::LOGIN_ATTEMPTS, email);
        self.delete(&key).await
    }

    // =========================================================================
    // Refresh Token Families
    // =========================================================================

    pub async fn set_token_family<T: Serialize>(
        &self,
        family_id: &str,
        head: &T,
        ttl: Duration,
    ) -> DbResult<()> {
        let key = format!("{}{}", keys::TOKEN_FAMILY, family_id);
        self.set(&key, head, ttl).await
    }

    pub async fn get_token_family<T: DeserializeOwned>(
        &self,
        family_id: &str,
    ) -> DbResult<Option<T>> {
        let key = format!("{}{}", keys::TOKEN_FAMILY, family_id);
        self.get(&key).await
    }

    pub async fn delete_token_family(&self, family_id: &str) -> DbResult<bool> {
        let key = format!("{}{}", keys::TOKEN_FAMILY, family_id);
        self.delete(&key).await
    }

    // =========================================================================
    // Session Metadata
    // =========================================================================

    pub async fn set_session_meta<T: Serialize>(
        &self,
        session_id: &str,
        meta: &T,
        ttl: Duration,
    ) -> DbResult<()> {
        let key = format!("{}{}", keys::SESSION_META, session_id);
        self.set(&key, meta, ttl).await
    }

    pub async fn get_session_meta<T: DeserializeOwned>(
        &self,
        session_id: &str,
    ) -> DbResult<Option<T>> {
        let key = format!("{}{}", keys::SESSION_META, session_id);
        self.get(&key).await
    }

    pub async fn delete_session_meta(&self, session_id: &str) -> DbResult<bool> {
        let key = format!("{}{}", keys::SESSION_META, session_id);
        self.delete(&key).await
    }

    // =========================================================================
    // CSRF Tokens
    // =========================================================================

    pub async fn add_csrf_token<T: Serialize>(&self, token: &str, record: &T) -> DbResult<()> {
        let key = format!("{}{}", keys::CSRF, token);
        self.set(&key, record, ttl::CSRF).await
    }

    pub async fn csrf_token_exists(&self, token: &str) -> DbResult<bool> {
        let key = format!("{}{}", keys::CSRF, token);
        self.exists(&key).await
    }

    pub async fn revoke_csrf_token(&self, token: &str) -> DbResult<bool> {
        let key = format!("{}{}", keys::CSRF, token);
        self.delete(&key).await
    }

    // =========================================================================
    // OAuth State Nonces
    // =========================================================================

    pub async fn set_oauth_state<T: Serialize>(&self, nonce: &str, record: &T) -> DbResult<()> {
        let key = format!("{}{}", keys::OAUTH_STATE, nonce);
        self.set(&key, record, ttl::OAUTH_STATE).await
    }

    /// Consume a state nonce: returns the record and removes the key in one
    /// round trip, so a replayed callback observes absence.
    pub async fn take_oauth_state<T: DeserializeOwned>(&self, nonce: &str) -> DbResult<Option<T>> {
        let key = format!("{}{}", keys::OAUTH_STATE, nonce);
        self.take(&key).await
    }

    // =========================================================================
    // Rate Limiting
    // =========================================================================

    /// Increment the rate-limit counter for an identifier, returning the
    /// post-increment count within the window.
    pub async fn rate_limit_incr(&self, identifier: &str, window: Duration) -> DbResult<i64> {
        let key = format!("{}{}", keys::RATE_LIMIT, identifier);
        self.incr_with_ttl(&key, window).await
    }

    /// Seconds until the window for an identifier resets
    pub async fn rate_limit_ttl(&self, identifier: &str) -> DbResult<i64> {
        let key = format!("{}{}", keys::RATE_LIMIT, identifier);
        let mut conn = self.pool.get().await?;
        let ttl: i64 = conn.ttl(&key).await?;
        Ok(ttl.max(0))
    }
}
