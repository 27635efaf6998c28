//! Password hashing and policy
//!
//! Argon2id with OWASP-recommended parameters. The policy requires length of
//! at least eight and one character from each of the four classes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

#[derive(Clone)]
pub struct PasswordService {
    config: PasswordConfig,
}

impl PasswordService {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    /// Hash a password with Argon2id. Enforces the strength policy first.
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        self.validate_strength(password)?;

        let salt = SaltString::generate(&mut OsRng);

        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            None,
        )
        .map_err(|e| AuthError::Internal(format!("Invalid Argon2 params: {}", e)))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| AuthError::PasswordHashingFailed)?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::PasswordHashingFailed)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(AuthError::PasswordHashingFailed),
        }
    }

    /// Validate the password policy: length plus the four character classes
    pub fn validate_strength(&self, password: &str) -> AuthResult<()> {
        let mut errors = Vec::new();

        if password.len() < self.config.min_password_length {
            errors.push(format!(
                "Password must be at least {} characters",
                self.config.min_password_length
            ));
        }

        if password.len() > self.config.max_password_length {
            errors.push(format!(
                "Password must be at most {} characters",
                self.config.max_password_length
            ));
        }

        if !password.chars().any(|c| c.is_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }

        if !password.chars().any(|c| c.is_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one digit".to_string());
        }

        if !password.chars().any(|c| !c.is_alphanumeric()) {
            errors.push("Password must contain at least one special character".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::WeakPassword(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PasswordConfig {
        PasswordConfig {
            // Low-cost parameters so tests stay fast
            memory_cost: 4096,
            time_cost: 1,
            parallelism: 1,
            min_password_length: 8,
            max_password_length: 128,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let service = PasswordService::new(test_config());
        let password = "Password123!";

        let hash = service.hash_password(password).unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(service.verify_password(password, &hash).unwrap());
        assert!(!service.verify_password("WrongPassword123!", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_hashes() {
        let service = PasswordService::new(test_config());
        let password = "Password123!";

        let hash1 = service.hash_password(password).unwrap();
        let hash2 = service.hash_password(password).unwrap();
        assert_ne!(hash1, hash2);

        assert!(service.verify_password(password, &hash1).unwrap());
        assert!(service.verify_password(password, &hash2).unwrap());
    }

    #[test]
    fn test_policy_matrix() {
        let service = PasswordService::new(test_config());

        assert!(service.validate_strength("Password123!").is_ok());

        // Too short
        assert!(service.validate_strength("Pw1!").is_err());
        // No uppercase
        assert!(service.validate_strength("password123!").is_err());
        // No lowercase
        assert!(service.validate_strength("PASSWORD123!").is_err());
        // No digit
        assert!(service.validate_strength("Password!!!!").is_err());
        // No special character
        assert!(service.validate_strength("Password1234").is_err());
    }

    #[test]
    fn test_policy_error_lists_failures() {
        let service = PasswordService::new(test_config());
        let err = service.validate_strength("pw").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("at least 8 characters"));
        assert!(msg.contains("uppercase"));
        assert!(msg.contains("digit"));
    }

    #[test]
    fn test_garbage_hash_is_internal_error() {
        let service = PasswordService::new(test_config());
        assert!(matches!(
            service.verify_password("Password123!", "not-a-phc-string"),
            Err(AuthError::PasswordHashingFailed)
        ));
    }
}
