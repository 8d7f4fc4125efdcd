use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::auth::dto::{
    AuthResponse, LoginRequest, LogoutRequest, PublicUser, RefreshRequest, RegisterRequest,
    TokensResponse,
};
use crate::auth::error::AuthError;
use crate::auth::extractors::{AuthClaims, CurrentUser};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/profile", get(profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    payload.validate()?;
    let (user, tokens) = state
        .sessions
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

#[instrument(skip(state, addr, payload))]
pub async fn login(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let result = state
        .sessions
        .login(&payload.email, &payload.password)
        .await;
    if matches!(&result, Err(AuthError::InvalidCredentials)) {
        warn!(
            email = %payload.email,
            client = ?addr.map(|ConnectInfo(a)| a),
            "failed login attempt"
        );
    }
    let (user, tokens) = result?;
    Ok(Json(AuthResponse { user, tokens }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokensResponse>, AuthError> {
    let tokens = state.sessions.refresh(&payload.refresh_token).await?;
    Ok(Json(TokensResponse { tokens }))
}

/// Always answers 200: revocation is best-effort, the client discarding its
/// token is the primary mechanism. A missing or non-JSON body counts as "no
/// token supplied".
#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let token = payload.as_ref().and_then(|p| p.refresh_token.as_deref());
    state.sessions.logout(token).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[instrument(skip(state, current))]
pub async fn logout_all(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<serde_json::Value>, AuthError> {
    state.sessions.logout_all(current.user.id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[instrument(skip(state, claims))]
pub async fn profile(
    State(state): State<AppState>,
    AuthClaims(claims): AuthClaims,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.sessions.profile(claims.sub).await?;
    Ok(Json(user))
}

// Password reset is deliberately not implemented. The routes exist so
// clients get a clear status instead of a 404.
pub async fn forgot_password() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

pub async fn reset_password() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}
