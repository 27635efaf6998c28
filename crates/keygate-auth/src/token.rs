//! Token service
//!
//! Issues and validates the two bearer-token classes. Access and refresh
//! tokens are signed with distinct secrets and carry the same claim set
//! (`sub`, `email`, `role`, `sid`, `fid`), so a token of one class never
//! verifies as the other. Access-token verification never touches a store;
//! refresh verification is paired with the family-head check in the session
//! engine.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use keygate_db::DbUser;
use rand::RngCore;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::{TokenClaims, TokenPair, TokenType, UserRole};

/// Bytes of entropy in opaque tokens (256 bits)
const RANDOM_TOKEN_BYTES: usize = 32;

/// Generate a url-safe random token with at least 256 bits of entropy.
/// Used for refresh-token-family ids and email/reset/CSRF/OAuth-state tokens.
pub fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// JWT issuance and validation with separate access/refresh keys
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenService {
    pub fn new(config: JwtConfig) -> Self {
        let access_encoding = EncodingKey::from_secret(config.access_secret.as_bytes());
        let access_decoding = DecodingKey::from_secret(config.access_secret.as_bytes());
        let refresh_encoding = EncodingKey::from_secret(config.refresh_secret.as_bytes());
        let refresh_decoding = DecodingKey::from_secret(config.refresh_secret.as_bytes());

        Self {
            config,
            access_encoding,
            access_decoding,
            refresh_encoding,
            refresh_decoding,
        }
    }

    /// Issue an access + refresh pair for a session within a token family
    pub fn issue_pair(
        &self,
        user: &DbUser,
        session_id: Uuid,
        family_id: &str,
    ) -> AuthResult<TokenPair> {
        let now = Utc::now();
        let access_exp = now
            + Duration::from_std(self.config.access_token_lifetime)
                .map_err(|e| AuthError::Internal(e.to_string()))?;
        let refresh_exp = now
            + Duration::from_std(self.config.refresh_token_lifetime)
                .map_err(|e| AuthError::Internal(e.to_string()))?;

        let role = UserRole::from_db(&user.role);

        let access_claims = self.claims(
            user,
            role,
            session_id,
            family_id,
            TokenType::Access,
            now.timestamp(),
            access_exp.timestamp(),
        );
        let access_token = encode(&Header::default(), &access_claims, &self.access_encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to encode access token: {}", e)))?;

        let refresh_claims = self.claims(
            user,
            role,
            session_id,
            family_id,
            TokenType::Refresh,
            now.timestamp(),
            refresh_exp.timestamp(),
        );
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.refresh_encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to encode refresh token: {}", e)))?;

        Ok(TokenPair::new(
            access_token,
            refresh_token,
            access_exp.timestamp(),
            refresh_exp.timestamp(),
        ))
    }

    /// Validate an access token and return its claims
    pub fn verify_access(&self, token: &str) -> AuthResult<TokenClaims> {
        let claims = self.decode_with(token, &self.access_decoding)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidTokenType);
        }
        Ok(claims)
    }

    /// Validate a refresh token and return its claims
    pub fn verify_refresh(&self, token: &str) -> AuthResult<TokenClaims> {
        let claims = self.decode_with(token, &self.refresh_decoding)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidTokenType);
        }
        Ok(claims)
    }

    /// Access-token lifetime in seconds, for `expiresIn` style responses
    pub fn access_lifetime_secs(&self) -> i64 {
        self.config.access_token_lifetime.as_secs() as i64
    }

    /// Refresh-token lifetime (drives session row expiry and family TTL)
    pub fn refresh_lifetime(&self) -> std::time::Duration {
        self.config.refresh_token_lifetime
    }

    #[allow(clippy::too_many_arguments)]
    fn claims(
        &self,
        user: &DbUser,
        role: UserRole,
        session_id: Uuid,
        family_id: &str,
        token_type: TokenType,
        iat: i64,
        exp: i64,
    ) -> TokenClaims {
        TokenClaims {
            sub: user.id.to_string(),
            token_type,
            email: user.email.clone(),
            role,
            sid: session_id.to_string(),
            fid: family_id.to_string(),
            iat,
            nbf: iat,
            exp,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn decode_with(&self, token: &str, key: &DecodingKey) -> AuthResult<TokenClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let token_data = decode::<TokenClaims>(token, key, &validation)?;
        Ok(token_data.claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-key-at-least-32-bytes!".to_string(),
            refresh_secret: "refresh-secret-key-at-least-32-bytes".to_string(),
            access_token_lifetime: std::time::Duration::from_secs(900),
            refresh_token_lifetime: std::time::Duration::from_secs(604800),
            issuer: "keygate".to_string(),
            audience: "keygate-api".to_string(),
        }
    }

    fn test_user() -> DbUser {
        DbUser {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            email_verified: false,
            password_hash: Some("$argon2id$...".to_string()),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            user_name: None,
            role: "USER".to_string(),
            is_active: true,
            is_suspended: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_round_trip() {
        let service = TokenService::new(test_config());
        let user = test_user();
        let session_id = Uuid::new_v4();
        let family_id = random_token();

        let pair = service.issue_pair(&user, session_id, &family_id).unwrap();
        assert_eq!(pair.token_type, "Bearer");

        let access = service.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.email, "test@example.com");
        assert_eq!(access.sid, session_id.to_string());
        assert_eq!(access.fid, family_id);
        assert_eq!(access.role, UserRole::User);

        let refresh = service.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.fid, family_id);
    }

    #[test]
    fn test_cross_verification_fails() {
        let service = TokenService::new(test_config());
        let user = test_user();
        let pair = service
            .issue_pair(&user, Uuid::new_v4(), &random_token())
            .unwrap();

        // Signed with different secrets, so the signature check fails before
        // the token_type check is reached.
        assert!(matches!(
            service.verify_refresh(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            service.verify_access(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut other_config = test_config();
        other_config.issuer = "someone-else".to_string();
        let issuer = TokenService::new(other_config);
        let validator = TokenService::new(test_config());

        let pair = issuer
            .issue_pair(&test_user(), Uuid::new_v4(), &random_token())
            .unwrap();

        assert!(validator.verify_access(&pair.access_token).is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let mut other_config = test_config();
        other_config.audience = "another-api".to_string();
        let issuer = TokenService::new(other_config);
        let validator = TokenService::new(test_config());

        let pair = issuer
            .issue_pair(&test_user(), Uuid::new_v4(), &random_token())
            .unwrap();

        assert!(validator.verify_access(&pair.access_token).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let service = TokenService::new(test_config());
        assert!(matches!(
            service.verify_access("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = TokenService::new(test_config());
        let pair = service
            .issue_pair(&test_user(), Uuid::new_v4(), &random_token())
            .unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.pop();
        tampered.push('x');

        assert!(service.verify_access(&tampered).is_err());
    }

    #[test]
    fn test_random_token_properties() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        // 32 bytes, unpadded base64 = 43 characters
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
