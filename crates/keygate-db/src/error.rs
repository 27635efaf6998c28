//! Store error types
//!
//! One error type spans both stores. Repositories surface the two row-level
//! outcomes the engines act on — a required row that is missing, and a
//! unique-constraint hit (email, user name, session token, provider link) —
//! so callers never inspect driver errors. Everything else keeps its driver
//! detail for logging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A store could not be reached at startup
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// Embedded migrations failed to apply
    #[error("Migration failed: {0}")]
    Migration(String),

    /// PostgreSQL driver error on the durable path
    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Redis operation failed on the ephemeral path
    #[error("Redis error: {0}")]
    Redis(String),

    /// A row the caller required does not exist (unknown user, session not
    /// owned by the caller, provider not linked)
    #[error("{0}")]
    NotFound(String),

    /// Unique-constraint violation; the message names the conflicting field
    #[error("{0}")]
    Duplicate(String),

    /// A cached payload could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<deadpool_redis::PoolError> for DbError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        DbError::Redis(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for DbError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        DbError::Redis(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

/// Result type for store operations
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_messages_pass_through_verbatim() {
        // Engines forward these messages to clients, so no prefix noise.
        let err = DbError::Duplicate("Email a@example.com already exists".to_string());
        assert_eq!(err.to_string(), "Email a@example.com already exists");

        let err = DbError::NotFound("Session not found".to_string());
        assert_eq!(err.to_string(), "Session not found");
    }

    #[test]
    fn test_driver_errors_keep_their_detail() {
        let err = DbError::Connection("PostgreSQL: refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = DbError::Redis("timed out".to_string());
        assert!(err.to_string().starts_with("Redis error"));
    }
}
