//! API integration tests
//!
//! Exercises the request/response cycle through `tower::ServiceExt::oneshot`.
//! Cases that need live PostgreSQL/Redis are marked `#[ignore]`; set
//! DATABASE_URL and REDIS_URL and run with `--ignored` to execute them
//! against real stores.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use keygate_api::{create_router, ApiConfig, AppState};
use keygate_auth::{AuthConfig, AuthService, LogMailer};
use keygate_db::{Database, DatabaseConfig};

async fn test_router() -> Router {
    let db_config = DatabaseConfig::default();
    let db = Arc::new(
        Database::connect(&db_config)
            .await
            .expect("test stores must be reachable"),
    );
    db.migrate().await.expect("migrations");

    let mut auth_config = AuthConfig::default();
    auth_config.jwt.access_secret = "test-access-secret-at-least-32-bytes!!".to_string();
    auth_config.jwt.refresh_secret = "test-refresh-secret-at-least-32-bytes!".to_string();
    auth_config.frontend_url = "http://localhost:5173".to_string();
    // Cheap hashing keeps the suite fast
    auth_config.password.memory_cost = 4096;
    auth_config.password.time_cost = 1;

    let mailer = Arc::new(LogMailer::new(&auth_config.frontend_url));
    let auth = Arc::new(AuthService::new(db.clone(), mailer, auth_config));

    create_router(Arc::new(AppState::new(db, auth)), ApiConfig::default())
}

async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let body = match body {
        Some(json_body) => Body::from(serde_json::to_vec(&json_body).unwrap()),
        None => Body::empty(),
    };

    let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(json!(null));

    (status, json)
}

async fn csrf_token(router: &Router) -> String {
    let (status, body) = json_request(router, "GET", "/api/v1/auth/csrf-token", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["csrfToken"].as_str().unwrap().to_string()
}

fn unique_email(prefix: &str) -> String {
    format!("{}+{}@example.com", prefix, uuid::Uuid::new_v4().simple())
}

// =============================================================================
// CSRF enforcement
// =============================================================================

mod csrf {
    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn mutating_request_without_token_is_forbidden() {
        let router = test_router().await;

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": "test@example.com",
                "password": "Password123!",
                "firstName": "Test",
                "lastName": "User"
            })),
            &[],
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn get_requests_skip_the_check() {
        let router = test_router().await;
        let (status, _) = json_request(&router, "GET", "/api/v1/auth/csrf-token", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn token_is_returned_in_header_and_body() {
        let router = test_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/auth/csrf-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let header = response
            .headers()
            .get("X-CSRF-Token")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .expect("header present");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["csrfToken"].as_str().unwrap(), header);
    }
}

// =============================================================================
// Registration and login
// =============================================================================

mod register_login {
    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn register_then_duplicate_conflicts() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;
        let email = unique_email("register");

        let payload = json!({
            "email": email,
            "password": "Password123!",
            "firstName": "Test",
            "lastName": "User"
        });

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(payload.clone()),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["user"]["email"], email);
        assert!(body["data"]["tokens"]["accessToken"].is_string());
        assert!(body["data"]["tokens"]["refreshToken"].is_string());

        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(payload),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn weak_password_is_rejected() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": unique_email("weak"),
                "password": "alllowercase1!",
                "firstName": "Test",
                "lastName": "User"
            })),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("uppercase"));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn login_good_then_bad() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;
        let email = unique_email("login");

        json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": email,
                "password": "Password123!",
                "firstName": "Test",
                "lastName": "User"
            })),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": email, "password": "Password123!"})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["tokens"]["refreshToken"].is_string());

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": email, "password": "WrongPassword123!"})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn unknown_email_gets_the_same_message() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({
                "email": unique_email("ghost"),
                "password": "Password123!"
            })),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn lockout_after_five_failures() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;
        let email = unique_email("lockout");

        json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": email,
                "password": "Password123!",
                "firstName": "Test",
                "lastName": "User"
            })),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        for _ in 0..5 {
            json_request(
                &router,
                "POST",
                "/api/v1/auth/login",
                Some(json!({"email": email, "password": "WrongPassword123!"})),
                &[("X-CSRF-Token", &csrf)],
            )
            .await;
        }

        // Even the correct password fails while locked, and the message
        // carries the remaining minutes.
        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": email, "password": "Password123!"})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("locked"));
        assert!(message.contains("minutes"));
    }
}

// =============================================================================
// Refresh rotation
// =============================================================================

mod rotation {
    use super::*;

    async fn register(router: &Router, csrf: &str) -> (String, String) {
        let email = unique_email("rotate");
        let (status, body) = json_request(
            router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": email,
                "password": "Password123!",
                "firstName": "Test",
                "lastName": "User"
            })),
            &[("X-CSRF-Token", csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        (
            body["data"]["tokens"]["accessToken"]
                .as_str()
                .unwrap()
                .to_string(),
            body["data"]["tokens"]["refreshToken"]
                .as_str()
                .unwrap()
                .to_string(),
        )
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn rotation_and_reuse_detection() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;
        let (_, r0) = register(&router, &csrf).await;

        // First rotation succeeds
        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": r0})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let r1 = body["data"]["tokens"]["refreshToken"]
            .as_str()
            .unwrap()
            .to_string();
        assert_ne!(r0, r1);

        // Replaying the rotated-away token is reuse
        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": r0})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Reuse containment burned the family: the newest token fails too
        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": r1})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn garbage_refresh_token_is_unauthorized() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;

        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": "garbage"})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn logout_is_idempotent() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;

        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/logout",
            Some(json!({"refreshToken": "unknown-token"})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn password_change_invalidates_sessions() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;
        let (access, refresh) = register(&router, &csrf).await;

        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/change-password",
            Some(json!({
                "currentPassword": "Password123!",
                "newPassword": "Password456!"
            })),
            &[
                ("X-CSRF-Token", &csrf),
                ("Authorization", &format!("Bearer {}", access)),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Every prior refresh token is dead
        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": refresh})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Sessions
// =============================================================================

mod sessions {
    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn inventory_and_revoke_others() {
        let router = test_router().await;
        let csrf = csrf_token(&router).await;
        let email = unique_email("sessions");

        // First session via register, second via login
        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": email,
                "password": "Password123!",
                "firstName": "Test",
                "lastName": "User"
            })),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let refresh_b = body["data"]["tokens"]["refreshToken"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": email, "password": "Password123!"})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let access_a = body["data"]["tokens"]["accessToken"]
            .as_str()
            .unwrap()
            .to_string();
        let refresh_a = body["data"]["tokens"]["refreshToken"]
            .as_str()
            .unwrap()
            .to_string();

        // Both listed, exactly one current
        let (status, body) = json_request(
            &router,
            "GET",
            "/api/v1/sessions",
            None,
            &[("Authorization", &format!("Bearer {}", access_a))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let sessions = body["data"]["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(
            sessions
                .iter()
                .filter(|s| s["isCurrent"].as_bool().unwrap())
                .count(),
            1
        );

        // Revoke the other session
        let (status, _) = json_request(
            &router,
            "DELETE",
            "/api/v1/sessions/other",
            None,
            &[
                ("X-CSRF-Token", &csrf),
                ("Authorization", &format!("Bearer {}", access_a)),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // B's refresh token is dead, A's still rotates
        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": refresh_b})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refreshToken": refresh_a})),
            &[("X-CSRF-Token", &csrf)],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn inventory_requires_auth() {
        let router = test_router().await;
        let (status, _) = json_request(&router, "GET", "/api/v1/sessions", None, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// OAuth surface (no provider round trips)
// =============================================================================

mod oauth {
    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn unknown_provider_is_not_found() {
        let router = test_router().await;
        let (status, _) =
            json_request(&router, "GET", "/api/v1/auth/oauth/facebook", None, &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL and Redis"]
    async fn callback_with_bad_state_redirects_to_error_page() {
        let router = test_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/auth/oauth/google/callback?code=x&state=forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(location.contains("/auth/error"));
    }
}
