use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::auth::store::UserStore;

/// Postgres-backed credential store. Refresh-token mutations are single
/// statements over the `refresh_tokens` array column, so rotation needs no
/// read-modify-write window: the `WHERE $old = ANY(refresh_tokens)` guard
/// makes the swap conditional on the old token still being live.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, refresh_tokens, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, refresh_tokens, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, refresh_tokens, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_refresh_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, refresh_tokens, created_at, updated_at
            FROM users
            WHERE $1 = ANY(refresh_tokens)
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn push_refresh_token(&self, id: Uuid, token: &str) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_tokens = array_append(refresh_tokens, $2), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("user {id} not found");
        }
        Ok(())
    }

    async fn rotate_refresh_token(&self, old: &str, new: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET refresh_tokens = array_replace(refresh_tokens, $1, $2), updated_at = now()
            WHERE $1 = ANY(refresh_tokens)
            RETURNING id, name, email, password_hash, refresh_tokens, created_at, updated_at
            "#,
        )
        .bind(old)
        .bind(new)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn remove_refresh_token(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_tokens = array_remove(refresh_tokens, $1), updated_at = now()
            WHERE $1 = ANY(refresh_tokens)
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_tokens = '{}', updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
