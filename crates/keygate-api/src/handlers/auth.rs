//! Authentication handlers
//!
//! Register, login, refresh rotation, logout, email verification, password
//! recovery and the CSRF token endpoint. All bodies go through validation;
//! success responses use the `{status, message?, data?}` envelope.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::dto::{
    ApiResponse, AuthData, ChangePasswordRequest, CsrfTokenData, EmptyResponse,
    ForgotPasswordRequest, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, TokensData, TokensDto, UserData, UserDto, VerifyEmailRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ClientIp, RequireAuth, UserAgent, ValidatedJson};
use crate::middleware::CSRF_HEADER;
use crate::state::AppState;
use keygate_auth::{PublicUser, RegisterInput};

/// Issue a CSRF token.
///
/// The token is returned both in the body and the `X-CSRF-Token` header;
/// clients echo it in the same request header on state-changing calls.
#[utoipa::path(
    get,
    path = "/api/v1/auth/csrf-token",
    tag = "Authentication",
    responses(
        (status = 200, description = "Fresh CSRF token", body = CsrfTokenData)
    )
)]
pub async fn csrf_token(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let token = state.auth.csrf.generate_token().await.map_err(ApiError::from)?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = token.parse() {
        headers.insert(CSRF_HEADER, value);
    }

    Ok((
        headers,
        Json(ApiResponse::data(CsrfTokenData { csrf_token: token })),
    ))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthData),
        (status = 400, description = "Validation or password policy failure"),
        (status = 403, description = "Missing CSRF token"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    UserAgent(user_agent): UserAgent,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, tokens) = state
        .auth
        .credentials
        .register(
            RegisterInput {
                email: request.email,
                password: request.password,
                first_name: request.first_name,
                last_name: request.last_name,
                user_name: request.user_name,
            },
            ip,
            user_agent,
        )
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(AuthData {
            user: UserDto::from(PublicUser::from(&user)),
            tokens: TokensDto::from(tokens),
        })),
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthData),
        (status = 401, description = "Invalid credentials or locked account"),
        (status = 403, description = "Missing CSRF token or disabled account")
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    UserAgent(user_agent): UserAgent,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthData>>> {
    let (user, tokens) = state
        .auth
        .credentials
        .login(&request.email, &request.password, ip, user_agent)
        .await?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(ApiResponse::data(AuthData {
        user: UserDto::from(PublicUser::from(&user)),
        tokens: TokensDto::from(tokens),
    })))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh token pair", body = TokensData),
        (status = 401, description = "Invalid, expired, or reused refresh token")
    )
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<TokensData>>> {
    let tokens = state.auth.sessions.refresh(&request.refresh_token).await?;

    Ok(Json(ApiResponse::data(TokensData {
        tokens: TokensDto::from(tokens),
    })))
}

/// Log out: delete the session behind a refresh token. Idempotent.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Authentication",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out")
    )
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<LogoutRequest>,
) -> ApiResult<Json<EmptyResponse>> {
    state.auth.sessions.logout(&request.refresh_token).await?;

    Ok(Json(EmptyResponse::message("Logged out")))
}

/// Consume an email verification token
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    tag = "Authentication",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Unknown, already verified, or expired token")
    )
)]
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<VerifyEmailRequest>,
) -> ApiResult<Json<EmptyResponse>> {
    state.auth.credentials.verify_email(&request.token).await?;

    Ok(Json(EmptyResponse::message("Email verified")))
}

/// Request a password reset link. Always succeeds so responses cannot be
/// used to enumerate accounts.
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Always succeeds")
    )
)]
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ForgotPasswordRequest>,
) -> ApiResult<Json<EmptyResponse>> {
    state
        .auth
        .credentials
        .request_password_reset(&request.email)
        .await?;

    Ok(Json(EmptyResponse::message(
        "If that email is registered, a reset link has been sent",
    )))
}

/// Consume a password reset token. All sessions of the user are revoked.
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated, all sessions revoked"),
        (status = 400, description = "Unknown, used, or expired token")
    )
)]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<Json<EmptyResponse>> {
    state
        .auth
        .credentials
        .reset_password(&request.token, &request.new_password)
        .await?;

    Ok(Json(EmptyResponse::message("Password has been reset")))
}

/// Change the password of the authenticated user. All sessions of the user
/// are revoked, including the current one.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Password changed, all sessions revoked"),
        (status = 401, description = "Not authenticated or wrong current password")
    )
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Json<EmptyResponse>> {
    state
        .auth
        .credentials
        .change_password(user.user_id, &request.current_password, &request.new_password)
        .await?;

    tracing::info!(user_id = %user.user_id, "password changed");

    Ok(Json(EmptyResponse::message("Password changed")))
}

/// Return the authenticated user
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Authentication",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserData),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    RequireAuth(principal): RequireAuth,
) -> ApiResult<Json<ApiResponse<UserData>>> {
    let user = state
        .auth
        .users
        .get_user_by_id(principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::data(UserData {
        user: UserDto::from(PublicUser::from(&user)),
    })))
}
