use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::jwt::TokenPair;
use crate::auth::repo_types::User;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = BTreeMap::new();
        let name_len = self.name.trim().chars().count();
        if !(2..=50).contains(&name_len) {
            errors.insert("name", "name must be 2-50 characters".to_string());
        }
        if !is_valid_email(self.email.trim()) {
            errors.insert("email", "invalid email".to_string());
        }
        if self.password.chars().count() < 8 {
            errors.insert("password", "password must be at least 8 characters".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(errors))
        }
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: String,
}

/// Request body for logout. The token is optional, clients discarding their
/// copy is the primary mechanism and server-side revocation a courtesy.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default, rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: Option<String>,
}

/// Response returned after register, login or refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

/// Response returned by refresh, which carries no user payload.
#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub tokens: TokenPair,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}
