use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Credential store contract. The session manager only ever talks to this
/// trait, so tests run against [`MemoryUserStore`] and production against
/// the Postgres-backed store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<User>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_by_refresh_token(&self, token: &str) -> anyhow::Result<Option<User>>;

    /// Append a refresh token to the user's live set.
    async fn push_refresh_token(&self, id: Uuid, token: &str) -> anyhow::Result<()>;

    /// Swap `old` for `new` in the owning user's set, in one atomic step
    /// that succeeds only while `old` is still present. Returns the owner,
    /// or `None` when no user currently holds `old`, which covers both
    /// never-issued and already-rotated tokens.
    async fn rotate_refresh_token(&self, old: &str, new: &str) -> anyhow::Result<Option<User>>;

    /// Remove `token` from whichever user holds it. Removing an absent
    /// token is not an error.
    async fn remove_refresh_token(&self, token: &str) -> anyhow::Result<()>;

    async fn clear_refresh_tokens(&self, id: Uuid) -> anyhow::Result<()>;
}

/// In-memory credential store. One mutex guards the whole map, so every
/// operation, rotation included, is atomic with respect to the others.
#[derive(Debug, Default, Clone)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> anyhow::Result<MutexGuard<'_, HashMap<Uuid, User>>> {
        self.users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store mutex poisoned"))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let mut users = self.users()?;
        if users.values().any(|u| u.email == email) {
            anyhow::bail!("duplicate email: {email}");
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            refresh_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users()?.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users()?.get(&id).cloned())
    }

    async fn find_by_refresh_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users()?
            .values()
            .find(|u| u.refresh_tokens.iter().any(|t| t == token))
            .cloned())
    }

    async fn push_refresh_token(&self, id: Uuid, token: &str) -> anyhow::Result<()> {
        let mut users = self.users()?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        user.refresh_tokens.push(token.to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn rotate_refresh_token(&self, old: &str, new: &str) -> anyhow::Result<Option<User>> {
        let mut users = self.users()?;
        for user in users.values_mut() {
            if let Some(slot) = user.refresh_tokens.iter_mut().find(|t| *t == old) {
                *slot = new.to_string();
                user.updated_at = OffsetDateTime::now_utc();
                return Ok(Some(user.clone()));
            }
        }
        Ok(None)
    }

    async fn remove_refresh_token(&self, token: &str) -> anyhow::Result<()> {
        let mut users = self.users()?;
        for user in users.values_mut() {
            let before = user.refresh_tokens.len();
            user.refresh_tokens.retain(|t| t != token);
            if user.refresh_tokens.len() != before {
                user.updated_at = OffsetDateTime::now_utc();
                break;
            }
        }
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: Uuid) -> anyhow::Result<()> {
        let mut users = self.users()?;
        if let Some(user) = users.get_mut(&id) {
            user.refresh_tokens.clear();
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}
