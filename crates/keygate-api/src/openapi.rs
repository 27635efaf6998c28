//! OpenAPI documentation

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto;
use crate::error::ErrorBody;
use crate::handlers;

/// Keygate API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keygate API",
        description = "Identity and session service: password and OAuth sign-in, \
                       refresh-token rotation with reuse detection, account lockout, \
                       CSRF protection and session inventory.",
        version = "1.0.0"
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development")
    ),
    paths(
        // Health
        handlers::health::health_check,
        handlers::health::readiness_check,
        // Auth
        handlers::auth::csrf_token,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::verify_email,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::change_password,
        handlers::auth::me,
        // OAuth
        handlers::oauth::authorize_url,
        handlers::oauth::callback,
        handlers::oauth::linked_providers,
        handlers::oauth::unlink_provider,
        // Sessions
        handlers::sessions::list_sessions,
        handlers::sessions::revoke_other_sessions,
        handlers::sessions::revoke_session,
    ),
    components(
        schemas(
            ErrorBody,
            handlers::health::HealthResponse,
            dto::RegisterRequest,
            dto::LoginRequest,
            dto::RefreshRequest,
            dto::LogoutRequest,
            dto::VerifyEmailRequest,
            dto::ForgotPasswordRequest,
            dto::ResetPasswordRequest,
            dto::ChangePasswordRequest,
            dto::UserDto,
            dto::TokensDto,
            dto::AuthData,
            dto::TokensData,
            dto::UserData,
            dto::CsrfTokenData,
            dto::SessionDto,
            dto::SessionsData,
            dto::RevokedData,
            dto::OAuthCallbackQuery,
            dto::AuthUrlData,
            dto::ProviderDto,
            dto::ProvidersData,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Authentication", description = "Credentials, tokens and recovery"),
        (name = "OAuth", description = "Google/GitHub sign-in and account linking"),
        (name = "Sessions", description = "Session inventory and revocation"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
pub struct ApiDoc;

/// Registers the bearer security scheme
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
