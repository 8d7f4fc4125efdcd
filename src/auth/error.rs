use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::auth::jwt::TokenError;

/// Internal reason a request failed authentication. Logged for operators,
/// never surfaced: the client sees a uniform 401 either way.
#[derive(Debug, Clone, Copy)]
pub enum Rejection {
    MissingToken,
    Expired,
    Invalid,
    Revoked,
    UnknownUser,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed")]
    Validation(BTreeMap<&'static str, String>),
    #[error("email already registered")]
    Conflict,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized(Rejection),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::Unauthorized(Rejection::Expired),
            TokenError::Invalid => AuthError::Unauthorized(Rejection::Invalid),
            TokenError::Other(_) => AuthError::Unauthorized(Rejection::Invalid),
        }
    }
}

/// Uniform error envelope for every failed request.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<BTreeMap<&'static str, String>>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AuthError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation failed".to_string(),
                Some(fields),
            ),
            AuthError::Conflict => (
                StatusCode::CONFLICT,
                "Email already registered".to_string(),
                None,
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid credentials".to_string(),
                None,
            ),
            AuthError::Unauthorized(reason) => {
                warn!(reason = ?reason, "request rejected");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None)
            }
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), None),
            AuthError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string(), None),
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };
        let body = ErrorBody {
            success: false,
            error: message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}
