//! CSRF token engine
//!
//! Opaque tokens handed out on demand and kept in the ephemeral store for 24
//! hours. Validation is an existence check; the token proves same-origin
//! fetch, while identity travels separately in the bearer token, so tokens
//! are deliberately not bound to a user.

use chrono::Utc;
use keygate_db::Database;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};
use crate::token::random_token;
use crate::types::CsrfRecord;

#[derive(Clone)]
pub struct CsrfService {
    db: Arc<Database>,
}

impl CsrfService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue a new CSRF token. The store write is authoritative here: a token
    /// that was never stored would fail every later validation.
    pub async fn generate_token(&self) -> AuthResult<String> {
        let token = random_token();
        let record = CsrfRecord {
            created_at: Utc::now(),
        };

        self.db
            .cache()
            .add_csrf_token(&token, &record)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))?;

        Ok(token)
    }

    /// True iff the token is live in the store
    pub async fn validate_token(&self, token: &str) -> AuthResult<bool> {
        if token.is_empty() {
            return Ok(false);
        }

        self.db
            .cache()
            .csrf_token_exists(token)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))
    }

    /// Explicitly revoke a token before its TTL
    pub async fn revoke_token(&self, token: &str) -> AuthResult<()> {
        self.db
            .cache()
            .revoke_csrf_token(token)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))?;
        Ok(())
    }
}
