//! Mail delivery abstraction
//!
//! Delivery itself is an external collaborator: the engines hand a recipient
//! and a token link to a `Mailer` and move on. Send failures are logged and
//! swallowed by callers so account existence never leaks through mail errors
//! and registration never fails on a mail outage.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outbound mail interface
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver an email-verification link containing `token`
    async fn send_verification(&self, to: &str, token: &str) -> Result<()>;

    /// Deliver a password-reset link containing `token`
    async fn send_password_reset(&self, to: &str, token: &str) -> Result<()>;
}

/// SMTP settings carried in configuration for real sender implementations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub from_name: String,
}

/// Local-dev sender that logs the link instead of sending real mail
#[derive(Debug, Clone)]
pub struct LogMailer {
    frontend_url: String,
}

impl LogMailer {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, to: &str, token: &str) -> Result<()> {
        info!(
            to = %to,
            link = %format!("{}/verify-email?token={}", self.frontend_url, token),
            "mail send stub: verification"
        );
        Ok(())
    }

    async fn send_password_reset(&self, to: &str, token: &str) -> Result<()> {
        info!(
            to = %to,
            link = %format!("{}/reset-password?token={}", self.frontend_url, token),
            "mail send stub: password reset"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_succeeds() {
        let mailer = LogMailer::new("http://localhost:5173");
        assert!(mailer
            .send_verification("test@example.com", "tok")
            .await
            .is_ok());
        assert!(mailer
            .send_password_reset("test@example.com", "tok")
            .await
            .is_ok());
    }
}
