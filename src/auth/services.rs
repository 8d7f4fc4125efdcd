use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::auth::error::{AuthError, Rejection};
use crate::auth::jwt::{JwtKeys, TokenPair};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::store::UserStore;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Session manager: owns the relationship between a user record and its
/// outstanding refresh tokens. All store access goes through the injected
/// [`UserStore`], all signing through [`JwtKeys`].
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    hash_cost: u32,
    dummy_hash: Arc<str>,
}

impl Sessions {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys, hash_cost: u32) -> anyhow::Result<Self> {
        // Burned on unknown-email logins so both login failure paths cost
        // about the same.
        let dummy_hash = hash_password("nobody-home", hash_cost)?;
        Ok(Self {
            store,
            keys,
            hash_cost,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(PublicUser, TokenPair), AuthError> {
        let email = normalize_email(email);
        let name = name.trim();
        if self.store.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "registration with taken email");
            return Err(AuthError::Conflict);
        }
        let hash = hash_password(password, self.hash_cost)?;
        let user = self.store.create(name, &email, &hash).await?;
        let tokens = self.keys.sign_pair(user.id, &user.email)?;
        // Second write. If it fails the user exists with no stored session,
        // which is fine: login still works.
        self.store
            .push_refresh_token(user.id, &tokens.refresh_token)
            .await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok((user.into(), tokens))
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(PublicUser, TokenPair), AuthError> {
        let email = normalize_email(email);
        let user = match self.store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                // Same work as the wrong-password path, so response timing
                // does not reveal whether the account exists.
                let _ = verify_password(password, &self.dummy_hash);
                warn!(email = %email, "login with unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(email = %email, user_id = %user.id, "login with invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        let tokens = self.keys.sign_pair(user.id, &user.email)?;
        // Append, never replace: each login is its own session and other
        // devices keep their refresh tokens.
        self.store
            .push_refresh_token(user.id, &tokens.refresh_token)
            .await?;
        info!(user_id = %user.id, "user logged in");
        Ok((user.into(), tokens))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.keys.verify_refresh(refresh_token)?;
        let tokens = self.keys.sign_pair(claims.sub, &claims.email)?;
        // One conditional store operation: swap old for new only while the
        // old token is still in the live set. A token that was already
        // rotated out or revoked fails here no matter how valid its
        // signature still is.
        let owner = self
            .store
            .rotate_refresh_token(refresh_token, &tokens.refresh_token)
            .await?;
        match owner {
            Some(user) => {
                debug!(user_id = %user.id, "refresh token rotated");
                Ok(tokens)
            }
            None => {
                warn!(user_id = %claims.sub, "refresh token not in live set");
                Err(AuthError::Unauthorized(Rejection::Revoked))
            }
        }
    }

    /// Best-effort revocation. A missing body or an unknown token still
    /// reports success, the client discarding its copy is the primary
    /// mechanism.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = refresh_token else {
            debug!("logout without refresh token");
            return Ok(());
        };
        match self.store.find_by_refresh_token(token).await? {
            Some(user) => {
                self.store.remove_refresh_token(token).await?;
                info!(user_id = %user.id, "session revoked");
            }
            None => debug!("logout token not in live set"),
        }
        Ok(())
    }

    /// Revokes every refresh token the user holds. Outstanding access
    /// tokens stay valid until natural expiry, at most one access-TTL
    /// window.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.clear_refresh_tokens(user_id).await?;
        info!(user_id = %user_id, "all sessions revoked");
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<PublicUser, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        Ok(user.into())
    }
}
