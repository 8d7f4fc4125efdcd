use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::PgUserStore;
use crate::auth::services::Sessions;
use crate::auth::store::UserStore;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub sessions: Sessions,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
        }

        let store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool));
        Self::from_parts(store, config)
    }

    /// Assemble state from an already-built store, tests hand in the
    /// in-memory one here.
    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let keys = JwtKeys::from_config(&config.jwt);
        let sessions = Sessions::new(store.clone(), keys, config.hash_cost)?;
        Ok(Self {
            store,
            sessions,
            config,
        })
    }
}
