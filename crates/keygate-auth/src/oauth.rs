//! OAuth engine
//!
//! Authorization-code flow against Google and GitHub with a one-shot state
//! nonce in the ephemeral store. Local accounts are created or linked under
//! the verified-email rule: an existing account must have a verified email
//! before a provider identity may be attached to it, which closes the
//! unverified-email takeover vector.

use chrono::Utc;
use keygate_db::{CreateUser, Database, DbUser};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::config::{OAuthConfig, OAuthProviderConfig};
use crate::error::{AuthError, AuthResult};
use crate::events::{SecurityContext, SecurityEvent, SecurityEvents};
use crate::session::SessionService;
use crate::token::random_token;
use crate::types::{LoginMethod, OAuthStateRecord, TokenPair, UserRole};

// =============================================================================
// Providers
// =============================================================================

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    /// Storage form, matches the `provider` column check constraint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
            Self::Github => "GITHUB",
        }
    }

    /// URL path form
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    /// Parse the path segment of `/auth/oauth/{provider}`
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_ascii_lowercase().as_str() {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            _ => None,
        }
    }

    fn authorize_endpoint(&self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::Github => "https://github.com/login/oauth/authorize",
        }
    }

    fn token_endpoint(&self) -> &'static str {
        match self {
            Self::Google => "https://oauth2.googleapis.com/token",
            Self::Github => "https://github.com/login/oauth/access_token",
        }
    }

    fn scopes(&self) -> &'static str {
        match self {
            Self::Google => "openid email profile",
            Self::Github => "read:user user:email",
        }
    }

    fn login_method(&self) -> LoginMethod {
        match self {
            Self::Google => LoginMethod::Google,
            Self::Github => LoginMethod::Github,
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Normalized profile returned by a provider exchange
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Outcome of a successful callback
#[derive(Debug)]
pub struct OAuthLogin {
    pub user: DbUser,
    pub tokens: TokenPair,
    pub is_new_user: bool,
}

/// A linked provider as reported to the account owner
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedProvider {
    pub provider: String,
    pub linked_at: chrono::DateTime<Utc>,
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    #[allow(dead_code)]
    verified: bool,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct OAuthService {
    db: Arc<Database>,
    sessions: Arc<SessionService>,
    events: SecurityEvents,
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthService {
    pub fn new(
        db: Arc<Database>,
        sessions: Arc<SessionService>,
        events: SecurityEvents,
        config: OAuthConfig,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()
            .unwrap_or_default();

        Self {
            db,
            sessions,
            events,
            config,
            http,
        }
    }

    fn provider_config(&self, provider: OAuthProvider) -> AuthResult<&OAuthProviderConfig> {
        let cfg = match provider {
            OAuthProvider::Google => &self.config.google,
            OAuthProvider::Github => &self.config.github,
        };

        if !cfg.is_configured() {
            return Err(AuthError::OAuthProviderError(format!(
                "{} is not configured",
                provider
            )));
        }

        Ok(cfg)
    }

    /// Build the provider authorization URL bound to a fresh state nonce.
    /// The nonce write is authoritative: without it the callback can never
    /// succeed, so a failure here surfaces as an error.
    pub async fn authorization_url(&self, provider: OAuthProvider) -> AuthResult<String> {
        let cfg = self.provider_config(provider)?;

        let state = random_token();
        let record = OAuthStateRecord {
            provider: provider.as_str().to_string(),
            timestamp: Utc::now(),
        };

        self.db
            .cache()
            .set_oauth_state(&state, &record)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))?;

        let mut authorize_url = url::Url::parse(provider.authorize_endpoint())
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        authorize_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &cfg.client_id)
            .append_pair("redirect_uri", &cfg.redirect_url)
            .append_pair("scope", provider.scopes())
            .append_pair("state", &state);

        Ok(authorize_url.to_string())
    }

    /// Handle the provider callback: consume the state nonce, exchange the
    /// code, find-or-create the local user, and mint a session.
    pub async fn callback(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<OAuthLogin> {
        // Single use: the nonce is consumed atomically, so a replayed
        // callback (or a provider-mixing attempt) observes absence.
        let record = match self
            .db
            .cache()
            .take_oauth_state::<OAuthStateRecord>(state)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(self.login_failed(provider, AuthError::InvalidOAuthState));
            }
            Err(e) => {
                return Err(self.login_failed(provider, AuthError::Cache(e.to_string())));
            }
        };

        if record.provider != provider.as_str() {
            return Err(self.login_failed(provider, AuthError::InvalidOAuthState));
        }

        let profile = match self.exchange(provider, code).await {
            Ok(profile) => profile,
            Err(e) => return Err(self.login_failed(provider, e)),
        };

        let (user, is_new_user) = match self.find_or_create_user(provider, &profile).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.login_failed(provider, e)),
        };

        let tokens = self
            .sessions
            .issue_for_user(&user, ip.clone(), user_agent.clone(), provider.login_method())
            .await?;

        self.events.emit(
            SecurityEvent::OauthLoginSuccess,
            SecurityContext::new()
                .user(user.id)
                .email(&user.email)
                .provider(provider.slug())
                .transport(ip, user_agent),
        );

        Ok(OAuthLogin {
            user,
            tokens,
            is_new_user,
        })
    }

    /// List the caller's linked providers
    pub async fn linked_providers(&self, user_id: Uuid) -> AuthResult<Vec<LinkedProvider>> {
        let accounts = self.db.oauth_repo().list_for_user(user_id).await?;

        Ok(accounts
            .into_iter()
            .map(|a| LinkedProvider {
                provider: a.provider.to_lowercase(),
                linked_at: a.created_at,
            })
            .collect())
    }

    /// Unlink a provider, refusing to remove the only sign-in method
    pub async fn unlink_provider(&self, user_id: Uuid, provider: OAuthProvider) -> AuthResult<()> {
        let user = self
            .db
            .user_repo()
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let link = self
            .db
            .oauth_repo()
            .find_for_user(user_id, provider.as_str())
            .await?;
        if link.is_none() {
            return Err(AuthError::OAuthNotLinked(provider.slug().to_string()));
        }

        if user.password_hash.is_none() {
            let linked = self.db.oauth_repo().count_for_user(user_id).await?;
            if linked <= 1 {
                return Err(AuthError::LastAuthMethod);
            }
        }

        self.db
            .oauth_repo()
            .delete(user_id, provider.as_str())
            .await
            .map_err(|e| match e {
                keygate_db::DbError::NotFound(_) => {
                    AuthError::OAuthNotLinked(provider.slug().to_string())
                }
                other => other.into(),
            })?;

        Ok(())
    }

    // =========================================================================
    // Provider exchange
    // =========================================================================

    async fn exchange(&self, provider: OAuthProvider, code: &str) -> AuthResult<ProviderProfile> {
        let cfg = self.provider_config(provider)?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &cfg.client_id),
            ("client_secret", &cfg.client_secret),
            ("redirect_uri", &cfg.redirect_url),
        ];

        let response = self
            .http
            .post(provider.token_endpoint())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AuthError::OAuthProviderError(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let tokens: TokenEndpointResponse = response.json().await.map_err(|e| {
            AuthError::OAuthProviderError(format!("invalid token response: {}", e))
        })?;

        if let Some(error) = tokens.error {
            let detail = tokens.error_description.unwrap_or_default();
            return Err(AuthError::OAuthProviderError(format!(
                "{} {}",
                error, detail
            )));
        }

        let access_token = tokens
            .access_token
            .ok_or_else(|| AuthError::OAuthProviderError("no access token returned".into()))?;

        match provider {
            OAuthProvider::Google => self.google_profile(&access_token, tokens.refresh_token).await,
            OAuthProvider::Github => self.github_profile(&access_token, tokens.refresh_token).await,
        }
    }

    async fn google_profile(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
    ) -> AuthResult<ProviderProfile> {
        let info: GoogleUserInfo = self
            .http
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("userinfo failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("invalid userinfo: {}", e)))?;

        let email = info.email.ok_or(AuthError::OAuthEmailMissing)?;

        Ok(ProviderProfile {
            provider_id: info.id,
            email,
            name: info.name,
            avatar: info.picture,
            access_token: Some(access_token.to_string()),
            refresh_token,
        })
    }

    async fn github_profile(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
    ) -> AuthResult<ProviderProfile> {
        let user: GithubUser = self
            .http
            .get("https://api.github.com/user")
            .bearer_auth(access_token)
            .header("User-Agent", "keygate")
            .send()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("user fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("invalid user response: {}", e)))?;

        // GitHub hides the email on the user object when it is set private;
        // the emails endpoint still lists it.
        let email = match user.email {
            Some(email) if !email.is_empty() => email,
            _ => self.github_primary_email(access_token).await?,
        };

        Ok(ProviderProfile {
            provider_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            avatar: user.avatar_url,
            access_token: Some(access_token.to_string()),
            refresh_token,
        })
    }

    async fn github_primary_email(&self, access_token: &str) -> AuthResult<String> {
        let emails: Vec<GithubEmail> = self
            .http
            .get("https://api.github.com/user/emails")
            .bearer_auth(access_token)
            .header("User-Agent", "keygate")
            .send()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("email fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AuthError::OAuthProviderError(format!("invalid emails response: {}", e)))?;

        emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| emails.first())
            .map(|e| e.email.clone())
            .ok_or(AuthError::OAuthEmailMissing)
    }

    // =========================================================================
    // Account linking
    // =========================================================================

    async fn find_or_create_user(
        &self,
        provider: OAuthProvider,
        profile: &ProviderProfile,
    ) -> AuthResult<(DbUser, bool)> {
        if let Some(user) = self.db.user_repo().find_by_email(&profile.email).await? {
            let existing_link = self
                .db
                .oauth_repo()
                .find_for_user(user.id, provider.as_str())
                .await?;

            if existing_link.is_none() {
                // The takeover gate: an attacker who registered this address
                // without proving control of it must not gain the link.
                if !user.email_verified {
                    return Err(AuthError::OAuthLinkRequiresVerifiedEmail);
                }

                self.link(provider, user.id, profile).await?;
            }

            return Ok((user, false));
        }

        let (first_name, last_name) = split_name(profile.name.as_deref(), &profile.email);

        let user = match self
            .db
            .user_repo()
            .create(CreateUser {
                email: profile.email.clone(),
                password_hash: None,
                first_name,
                last_name,
                user_name: None,
                role: UserRole::User.as_str().to_string(),
                // The provider asserted control of the address, so the local
                // account starts verified and stays linkable.
                email_verified: true,
            })
            .await
        {
            Ok(user) => user,
            Err(keygate_db::DbError::Duplicate(_)) => return Err(AuthError::EmailExists),
            Err(e) => return Err(e.into()),
        };

        self.link(provider, user.id, profile).await?;

        Ok((user, true))
    }

    async fn link(
        &self,
        provider: OAuthProvider,
        user_id: Uuid,
        profile: &ProviderProfile,
    ) -> AuthResult<()> {
        match self
            .db
            .oauth_repo()
            .create(
                user_id,
                provider.as_str(),
                &profile.provider_id,
                profile.access_token.as_deref(),
                profile.refresh_token.as_deref(),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(keygate_db::DbError::Duplicate(_)) => {
                Err(AuthError::OAuthAccountTaken(provider.slug().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn login_failed(&self, provider: OAuthProvider, error: AuthError) -> AuthError {
        self.events.emit(
            SecurityEvent::OauthLoginFailed,
            SecurityContext::new()
                .provider(provider.slug())
                .error(error.to_string()),
        );

        if error.is_server_error() {
            warn!(provider = %provider, error = %error, "oauth callback failed");
        }

        error
    }
}

/// Split a display name into first/last. Single-token names duplicate into
/// the last name; a missing name falls back to the email local part.
fn split_name(name: Option<&str>, email: &str) -> (String, String) {
    let name = match name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => email.split('@').next().unwrap_or(email).to_string(),
    };

    match name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.clone(), name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_slugs() {
        assert_eq!(OAuthProvider::from_slug("google"), Some(OAuthProvider::Google));
        assert_eq!(OAuthProvider::from_slug("GitHub"), Some(OAuthProvider::Github));
        assert_eq!(OAuthProvider::from_slug("facebook"), None);
        assert_eq!(OAuthProvider::Google.as_str(), "GOOGLE");
        assert_eq!(OAuthProvider::Github.slug(), "github");
    }

    #[test]
    fn test_provider_scopes() {
        assert_eq!(OAuthProvider::Google.scopes(), "openid email profile");
        assert_eq!(OAuthProvider::Github.scopes(), "read:user user:email");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name(Some("Ada Lovelace"), "ada@example.com"),
            ("Ada".to_string(), "Lovelace".to_string())
        );
        assert_eq!(
            split_name(Some("Ada Byron Lovelace"), "ada@example.com"),
            ("Ada".to_string(), "Byron Lovelace".to_string())
        );
        // Single-token names duplicate into the last name
        assert_eq!(
            split_name(Some("Madonna"), "m@example.com"),
            ("Madonna".to_string(), "Madonna".to_string())
        );
        // Missing name falls back to the email local part
        assert_eq!(
            split_name(None, "grace.hopper@example.com"),
            ("grace.hopper".to_string(), "grace.hopper".to_string())
        );
    }
}
