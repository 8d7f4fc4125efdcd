use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::state::AppState;

/// Verification failure, split so callers can tell "refresh now" apart
/// from "re-authenticate".
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token verification failed")]
    Other(#[source] jsonwebtoken::errors::Error),
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenError::Invalid,
        _ => TokenError::Other(err),
    }
}

/// Access/refresh token pair returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Holds JWT signing and verification keys with config data.
/// Access and refresh tokens are signed with separate secrets, so a
/// compromise of one cannot forge the other.
#[derive(Clone)]
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_days as u64) * 24 * 60 * 60),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, email: &str, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let (ttl, key) = match kind {
            TokenKind::Access => (self.access_ttl, &self.access_encoding),
            TokenKind::Refresh => (self.refresh_ttl, &self.refresh_encoding),
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, key)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, email, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, email, TokenKind::Refresh)
    }

    pub fn sign_pair(&self, user_id: Uuid, email: &str) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign_access(user_id, email)?,
            refresh_token: self.sign_refresh(user_id, email)?,
        })
    }

    fn verify_with_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, key, &validation).map_err(classify)?;
        if data.claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_with_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_with_kind(token, TokenKind::Refresh)
    }
}

/// Parses an `Authorization: Bearer <token>` header value. Absence or a
/// different scheme is not an error, the caller decides what missing means.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.keys().clone()
    }
}
