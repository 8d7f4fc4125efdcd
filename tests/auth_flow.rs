//! Endpoint-level tests driving the full router over the in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use inkpost::{
    app::build_app,
    auth::store::MemoryUserStore,
    config::{AppConfig, JwtConfig},
    state::AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    let config = Arc::new(AppConfig {
        database_url: "postgres://unused-in-tests".into(),
        jwt: JwtConfig {
            access_secret: "access-secret-0123456789-0123456789".into(),
            refresh_secret: "refresh-secret-0123456789-0123456789".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
        },
        hash_cost: 1,
    });
    let state = AppState::from_parts(Arc::new(MemoryUserStore::new()), config).expect("state");
    build_app(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_with_bearer(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn register_ann(app: &Router) -> Value {
    let (status, body) = send(
        app,
        post_json(
            "/auth/register",
            json!({"name": "Ann", "email": "ann@x.com", "password": "secret123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

fn token<'a>(body: &'a Value, kind: &str) -> &'a str {
    body["tokens"][kind].as_str().expect("token string")
}

#[tokio::test]
async fn register_returns_created_with_tokens() {
    let app = test_app();
    let body = register_ann(&app).await;
    assert_eq!(body["user"]["email"], "ann@x.com");
    assert_eq!(body["user"]["name"], "Ann");
    assert!(!token(&body, "accessToken").is_empty());
    assert!(!token(&body, "refreshToken").is_empty());
}

#[tokio::test]
async fn register_rejects_duplicate_email_ignoring_case() {
    let app = test_app();
    register_ann(&app).await;
    let (status, body) = send(
        &app,
        post_json(
            "/auth/register",
            json!({"name": "Ann Again", "email": "ANN@X.COM", "password": "secret123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn register_reports_field_level_validation_errors() {
    let app = test_app();
    let (status, body) = send(
        &app,
        post_json(
            "/auth/register",
            json!({"name": "A", "email": "nope", "password": "short"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["name"].is_string());
    assert!(body["errors"]["email"].is_string());
    assert!(body["errors"]["password"].is_string());
}

#[tokio::test]
async fn login_failure_does_not_reveal_which_credential_was_wrong() {
    let app = test_app();
    register_ann(&app).await;

    let (status, wrong_password) = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "ann@x.com", "password": "wrong"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_email) = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "bob@x.com", "password": "secret123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(wrong_password["error"], unknown_email["error"]);
    assert!(!wrong_password["error"]
        .as_str()
        .expect("message")
        .to_lowercase()
        .contains("email"));
}

#[tokio::test]
async fn login_accepts_mixed_case_email() {
    let app = test_app();
    register_ann(&app).await;
    let (status, body) = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "  Ann@X.com ", "password": "secret123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ann@x.com");
}

#[tokio::test]
async fn profile_requires_a_valid_access_token() {
    let app = test_app();
    let body = register_ann(&app).await;

    let (status, _) = send(&app, get_with_bearer("/auth/profile", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get_with_bearer("/auth/profile", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A refresh token is not a bearer credential.
    let (status, _) = send(
        &app,
        get_with_bearer("/auth/profile", Some(token(&body, "refreshToken"))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, profile) = send(
        &app,
        get_with_bearer("/auth/profile", Some(token(&body, "accessToken"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "ann@x.com");
    assert!(profile.get("passwordHash").is_none());
}

#[tokio::test]
async fn refresh_with_empty_token_is_unauthorized_not_a_crash() {
    let app = test_app();
    let (status, body) = send(&app, post_json("/auth/refresh", json!({"refreshToken": ""}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let app = test_app();
    let body = register_ann(&app).await;
    let original = token(&body, "refreshToken").to_string();

    let (status, rotated) = send(
        &app,
        post_json("/auth/refresh", json!({"refreshToken": original})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let next = token(&rotated, "refreshToken").to_string();
    assert_ne!(next, original);

    // Anti-replay: the consumed token is permanently dead.
    let (status, _) = send(
        &app,
        post_json("/auth/refresh", json!({"refreshToken": original})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, post_json("/auth/refresh", json!({"refreshToken": next}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_always_succeeds() {
    let app = test_app();
    let body = register_ann(&app).await;
    let refresh = token(&body, "refreshToken").to_string();

    let (status, _) = send(
        &app,
        post_json("/auth/logout", json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Second logout with the already-consumed token is still a 200.
    let (status, _) = send(
        &app,
        post_json("/auth/logout", json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // No body at all is fine too.
    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/auth/logout")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The revoked token no longer refreshes.
    let (status, _) = send(
        &app,
        post_json("/auth/refresh", json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_all_revokes_other_devices_but_not_outstanding_access_tokens() {
    let app = test_app();
    let first = register_ann(&app).await;
    let (status, second) = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "ann@x.com", "password": "secret123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/auth/logout-all")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token(&first, "accessToken")),
            )
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for body in [&first, &second] {
        let (status, _) = send(
            &app,
            post_json(
                "/auth/refresh",
                json!({"refreshToken": token(body, "refreshToken")}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Access tokens are stateless and ride out their TTL.
    let (status, _) = send(
        &app,
        get_with_bearer("/auth/profile", Some(token(&first, "accessToken"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A fresh login opens a new, independently valid session.
    let (status, fresh) = send(
        &app,
        post_json(
            "/auth/login",
            json!({"email": "ann@x.com", "password": "secret123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        post_json(
            "/auth/refresh",
            json!({"refreshToken": token(&fresh, "refreshToken")}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn password_reset_routes_are_stubs() {
    let app = test_app();
    for uri in ["/auth/forgot-password", "/auth/reset-password"] {
        let (status, _) = send(&app, post_json(uri, json!({"email": "ann@x.com"}))).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }
}

#[tokio::test]
async fn health_probe_answers() {
    let app = test_app();
    let response = app
        .oneshot(get_with_bearer("/health", None))
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
}
