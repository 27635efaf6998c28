//! Authentication configuration
//!
//! Centralized configuration for the token, credential, session and OAuth
//! engines with secure defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Password hashing configuration
    pub password: PasswordConfig,
    /// Account lockout configuration
    pub lockout: LockoutConfig,
    /// Email-delivered token lifetimes
    pub email_tokens: EmailTokenConfig,
    /// OAuth provider configuration
    pub oauth: OAuthConfig,
    /// Per-IP rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Frontend base URL for OAuth redirects and email links
    pub frontend_url: String,
}

/// JWT token configuration.
///
/// Access and refresh tokens are signed with distinct secrets so that a token
/// of one class never verifies as the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret for access tokens (at least 256 bits)
    pub access_secret: String,
    /// Secret for refresh tokens (at least 256 bits, distinct from access)
    pub refresh_secret: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime (also the session row lifetime)
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
    /// Token issuer claim
    pub issuer: String,
    /// Token audience claim
    pub audience: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(), // Must be set in production
            refresh_secret: String::new(),
            access_token_lifetime: Duration::from_secs(15 * 60), // 15 minutes
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            issuer: "keygate".to_string(),
            audience: "keygate-api".to_string(),
        }
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (OWASP recommends 19456 KiB = 19 MiB minimum)
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Minimum password length
    pub min_password_length: usize,
    /// Maximum password length (to prevent hashing DoS)
    pub max_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
            min_password_length: 8,
            max_password_length: 128,
        }
    }
}

/// Account lockout configuration, keyed by email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    /// Failed attempts before the account locks
    pub max_attempts: u32,
    /// How long a locked account stays locked
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::from_secs(30 * 60), // 30 minutes
        }
    }
}

/// Lifetimes of tokens delivered by email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTokenConfig {
    /// Window in which an email verification token is accepted
    #[serde(with = "humantime_serde")]
    pub verification_lifetime: Duration,
    /// Window in which a password reset token is accepted
    #[serde(with = "humantime_serde")]
    pub reset_lifetime: Duration,
}

impl Default for EmailTokenConfig {
    fn default() -> Self {
        Self {
            verification_lifetime: Duration::from_secs(24 * 60 * 60), // 24 hours
            reset_lifetime: Duration::from_secs(60 * 60),             // 1 hour
        }
    }
}

/// One OAuth provider's client registration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the provider
    pub redirect_url: String,
}

impl OAuthProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// OAuth configuration for the supported providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub google: OAuthProviderConfig,
    pub github: OAuthProviderConfig,
    /// Timeout for provider token/userinfo calls
    #[serde(with = "humantime_serde", default = "default_provider_timeout")]
    pub provider_timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            google: OAuthProviderConfig::default(),
            github: OAuthProviderConfig::default(),
            provider_timeout: default_provider_timeout(),
        }
    }
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Per-IP rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests allowed per window per IP
    pub max_requests: u32,
    /// Window duration
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl AuthConfig {
    /// Validate the configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.jwt.access_secret.is_empty() {
            errors.push("Access token secret must be set".to_string());
        } else if self.jwt.access_secret.len() < 32 {
            errors.push("Access token secret should be at least 256 bits (32 bytes)".to_string());
        }

        if self.jwt.refresh_secret.is_empty() {
            errors.push("Refresh token secret must be set".to_string());
        } else if self.jwt.refresh_secret.len() < 32 {
            errors.push("Refresh token secret should be at least 256 bits (32 bytes)".to_string());
        }

        if !self.jwt.access_secret.is_empty() && self.jwt.access_secret == self.jwt.refresh_secret {
            errors.push("Access and refresh token secrets must differ".to_string());
        }

        if self.password.memory_cost < 19456 {
            errors.push(
                "Argon2 memory cost should be at least 19456 KiB (OWASP recommendation)"
                    .to_string(),
            );
        }
        if self.password.time_cost < 2 {
            errors.push("Argon2 time cost should be at least 2 (OWASP recommendation)".to_string());
        }
        if self.password.min_password_length < 8 {
            errors.push("Minimum password length must be at least 8".to_string());
        }

        if self.lockout.max_attempts == 0 {
            errors.push("Lockout max attempts must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt.access_secret = "a".repeat(32);
        config.jwt.refresh_secret = "b".repeat(32);
        config
    }

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.jwt.access_token_lifetime, Duration::from_secs(15 * 60));
        assert_eq!(
            config.jwt.refresh_token_lifetime,
            Duration::from_secs(7 * 24 * 60 * 60)
        );
        assert_eq!(config.lockout.max_attempts, 5);
        assert_eq!(config.lockout.lockout_duration, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_validation_missing_secrets() {
        let config = AuthConfig::default();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Access token secret")));
        assert!(errors.iter().any(|e| e.contains("Refresh token secret")));
    }

    #[test]
    fn test_validation_rejects_shared_secret() {
        let mut config = valid_config();
        config.jwt.refresh_secret = config.jwt.access_secret.clone();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("must differ")));
    }

    #[test]
    fn test_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }
}
