//! API routes

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// API v1 routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/sessions", session_routes())
}

fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/csrf-token", get(handlers::auth::csrf_token))
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout))
        .route("/verify-email", post(handlers::auth::verify_email))
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .route("/reset-password", post(handlers::auth::reset_password))
        .route("/change-password", post(handlers::auth::change_password))
        .route("/me", get(handlers::auth::me))
        // OAuth: the static "linked" segment outranks the ":provider" capture
        .route("/oauth/linked", get(handlers::oauth::linked_providers))
        .route(
            "/oauth/:provider",
            get(handlers::oauth::authorize_url).delete(handlers::oauth::unlink_provider),
        )
        .route("/oauth/:provider/callback", get(handlers::oauth::callback))
}

fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::sessions::list_sessions))
        .route("/other", delete(handlers::sessions::revoke_other_sessions))
        .route("/:id", delete(handlers::sessions::revoke_session))
}

/// Swagger UI routes
pub fn swagger_routes() -> Router<Arc<AppState>> {
    use crate::openapi::ApiDoc;
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new().merge(
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}
