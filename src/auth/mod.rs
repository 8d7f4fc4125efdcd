use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod store;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::session_routes())
}
