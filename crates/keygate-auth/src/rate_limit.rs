//! Per-IP rate limiter backed by Redis counters
//!
//! Fixed-window INCR with the TTL set on the first hit of the window. Fails
//! open on a cache outage so the service keeps serving when Redis is down.

use keygate_db::Database;
use std::sync::Arc;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::{AuthError, AuthResult};

#[derive(Clone)]
pub struct RateLimiter {
    db: Arc<Database>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(db: Arc<Database>, config: RateLimitConfig) -> Self {
        Self { db, config }
    }

    /// Consume one request slot for an IP
    pub async fn check_ip(&self, ip: &str) -> AuthResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let identifier = format!("ip:{}", ip);

        let count = match self
            .db
            .cache()
            .rate_limit_incr(&identifier, self.config.window)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "rate limit counter unavailable, allowing request");
                return Ok(());
            }
        };

        if count > self.config.max_requests as i64 {
            let retry_after = self
                .db
                .cache()
                .rate_limit_ttl(&identifier)
                .await
                .unwrap_or(self.config.window.as_secs() as i64);

            return Err(AuthError::RateLimitExceeded {
                retry_after: retry_after as u64,
            });
        }

        Ok(())
    }
}
