use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::error::{AuthError, Rejection};
use crate::auth::jwt::{extract_bearer, JwtKeys};
use crate::auth::repo_types::User;
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::Unauthorized(Rejection::MissingToken))?;
    extract_bearer(header).ok_or(AuthError::Unauthorized(Rejection::MissingToken))
}

/// Verified access-token claims. Pure verification, no store access.
#[derive(Debug)]
pub struct AuthClaims(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let token = bearer_token(parts)?;
        let claims = keys.verify_access(token)?;
        Ok(AuthClaims(claims))
    }
}

/// Authenticated caller with the freshly loaded user record attached.
/// Loading catches deleted accounts still holding unexpired tokens.
#[derive(Debug)]
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
}

impl CurrentUser {
    /// Ownership gate for resource handlers.
    pub fn ensure_owner(&self, owner_id: Uuid) -> Result<(), AuthError> {
        ensure_owner(self.claims.sub, owner_id)
    }
}

/// Fails with `Forbidden` when the authenticated identity does not own the
/// resource. Distinct from `Unauthorized`: the caller is known, just not
/// the owner.
pub fn ensure_owner(authenticated: Uuid, owner_id: Uuid) -> Result<(), AuthError> {
    if authenticated == owner_id {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.sessions.keys().verify_access(token)?;
        let user = state
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::Unauthorized(Rejection::UnknownUser))?;
        Ok(CurrentUser { user, claims })
    }
}

/// Optional authentication for routes that serve anonymous callers too:
/// carries the identity when a usable token was presented, `None` otherwise.
pub struct MaybeUser(pub Option<CurrentUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            CurrentUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryUserStore, UserStore};
    use crate::config::{AppConfig, JwtConfig};
    use axum::http::Request;
    use std::sync::Arc;

    fn test_jwt_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-0123456789-0123456789".into(),
            refresh_secret: "refresh-secret-0123456789-0123456789".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
        }
    }

    fn make_keys() -> JwtKeys {
        JwtKeys::from_config(&test_jwt_config())
    }

    fn make_state() -> AppState {
        let config = Arc::new(AppConfig {
            database_url: "postgres://unused-in-tests".into(),
            jwt: test_jwt_config(),
            hash_cost: 1,
        });
        AppState::from_parts(Arc::new(MemoryUserStore::new()), config).expect("state")
    }

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/auth/profile");
        if let Some(value) = value {
            builder = builder.header(axum::http::header::AUTHORIZATION, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[test]
    fn ensure_owner_accepts_the_owner_only() {
        let owner = Uuid::new_v4();
        assert!(ensure_owner(owner, owner).is_ok());
        let err = ensure_owner(Uuid::new_v4(), owner).unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));
    }

    #[tokio::test]
    async fn auth_claims_accepts_a_valid_access_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id, "ann@x.com").expect("sign");
        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let AuthClaims(claims) = AuthClaims::from_request_parts(&mut parts, &keys)
            .await
            .expect("extract");
        assert_eq!(claims.sub, user_id);
    }

    #[tokio::test]
    async fn auth_claims_rejects_missing_header_and_refresh_tokens() {
        let keys = make_keys();

        let mut parts = parts_with_auth(None);
        let err = AuthClaims::from_request_parts(&mut parts, &keys)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));

        // A refresh token is never a valid bearer credential.
        let refresh = keys
            .sign_refresh(Uuid::new_v4(), "ann@x.com")
            .expect("sign");
        let mut parts = parts_with_auth(Some(&format!("Bearer {refresh}")));
        let err = AuthClaims::from_request_parts(&mut parts, &keys)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn current_user_rejects_tokens_of_deleted_accounts() {
        let state = make_state();
        // Well-signed token whose subject no longer exists in the store.
        let token = state
            .sessions
            .keys()
            .sign_access(Uuid::new_v4(), "ghost@x.com")
            .expect("sign");
        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn maybe_user_attaches_identity_only_when_presented() {
        let state = make_state();
        let user = state
            .store
            .create("Ann", "ann@x.com", "$argon2id$fake")
            .await
            .expect("create");
        let token = state
            .sessions
            .keys()
            .sign_access(user.id, &user.email)
            .expect("sign");

        let mut parts = parts_with_auth(None);
        let MaybeUser(anonymous) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        assert!(anonymous.is_none());

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let MaybeUser(known) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        let current = known.expect("identity attached");
        assert_eq!(current.user.id, user.id);
        assert_eq!(current.claims.sub, user.id);
        current.ensure_owner(user.id).expect("owner passes");
        let err = current.ensure_owner(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));
    }
}
