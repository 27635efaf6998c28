//! Core authentication types shared across the engines

use chrono::{DateTime, Utc};
use keygate_db::DbUser;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Roles
// =============================================================================

/// Two-value role model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse the role column; unknown values downgrade to `User`.
    pub fn from_db(role: &str) -> Self {
        match role {
            "ADMIN" => Self::Admin,
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tokens
// =============================================================================

/// Token class carried in the `token_type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims for both token classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Token class
    pub token_type: TokenType,
    /// User email
    pub email: String,
    /// User role
    pub role: UserRole,
    /// Session ID
    pub sid: String,
    /// Refresh-token family ID
    pub fid: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// JWT ID
    pub jti: String,
}

impl TokenClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sid).ok()
    }
}

/// Issued token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Always "Bearer"
    pub token_type: String,
}

impl TokenPair {
    pub fn new(
        access_token: String,
        refresh_token: String,
        access_expires_at: i64,
        refresh_expires_at: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: "Bearer".to_string(),
        }
    }
}

// =============================================================================
// Principal
// =============================================================================

/// Authenticated principal extracted from a verified access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    /// Session the bearer token was minted for
    pub session_id: Uuid,
    /// Refresh-token family of that session
    pub family_id: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

// =============================================================================
// Ephemeral records
// =============================================================================

/// Head pointer of a refresh-token family (`token_family:{id}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyHead {
    /// The most recently issued refresh token for the family
    pub current_token: String,
    pub user_id: Uuid,
}

/// Lockout state (`login_attempts:{email}`).
///
/// While counting, the key holds a bare integer so the increment stays
/// atomic; once locked it is rewritten as this JSON record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutRecord {
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutRecord {
    /// Parse either encoding of the key's value.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(attempts) = raw.trim().parse::<u32>() {
            return Some(Self {
                attempts,
                locked_until: None,
            });
        }
        serde_json::from_str(raw).ok()
    }

    /// Whether the record currently blocks logins
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    /// Whole minutes until the lock expires, rounded up, at least 1
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> u64 {
        self.locked_until
            .map(|until| {
                let secs = (until - now).num_seconds().max(0) as u64;
                secs.div_ceil(60).max(1)
            })
            .unwrap_or(0)
    }
}

/// Transport metadata for a session (`session_meta:{sessionId}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_used_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
    pub login_method: String,
}

/// CSRF token record (`csrf:{token}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfRecord {
    pub created_at: DateTime<Utc>,
}

/// OAuth state nonce record (`oauth:state:{nonce}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthStateRecord {
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Views
// =============================================================================

/// How a session was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    Password,
    Google,
    Github,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
            Self::Github => "github",
        }
    }
}

impl std::fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session row merged with its ephemeral metadata for the inventory listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

/// User shape safe to return to clients (no credential material)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_name: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&DbUser> for PublicUser {
    fn from(user: &DbUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            user_name: user.user_name.clone(),
            role: UserRole::from_db(&user.role),
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(UserRole::from_db("ADMIN"), UserRole::Admin);
        assert_eq!(UserRole::from_db("USER"), UserRole::User);
        assert_eq!(UserRole::from_db("something-else"), UserRole::User);
        assert_eq!(UserRole::Admin.as_str(), "ADMIN");
    }

    #[test]
    fn test_lockout_record_parses_counter() {
        let record = LockoutRecord::parse("3").unwrap();
        assert_eq!(record.attempts, 3);
        assert!(record.locked_until.is_none());
        assert!(!record.is_locked(Utc::now()));
    }

    #[test]
    fn test_lockout_record_parses_json() {
        let now = Utc::now();
        let locked = LockoutRecord {
            attempts: 5,
            locked_until: Some(now + Duration::minutes(30)),
        };
        let raw = serde_json::to_string(&locked).unwrap();

        let parsed = LockoutRecord::parse(&raw).unwrap();
        assert_eq!(parsed.attempts, 5);
        assert!(parsed.is_locked(now));
        assert_eq!(parsed.remaining_minutes(now), 30);
    }

    #[test]
    fn test_lockout_record_expired_lock() {
        let now = Utc::now();
        let record = LockoutRecord {
            attempts: 5,
            locked_until: Some(now - Duration::seconds(1)),
        };
        assert!(!record.is_locked(now));
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let now = Utc::now();
        let record = LockoutRecord {
            attempts: 5,
            locked_until: Some(now + Duration::seconds(61)),
        };
        assert_eq!(record.remaining_minutes(now), 2);
    }

    #[test]
    fn test_lockout_record_garbage() {
        assert!(LockoutRecord::parse("not json").is_none());
    }
}
