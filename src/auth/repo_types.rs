use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Deliberately not `Serialize`: the password
/// hash and the live refresh-token set must never leave the server, so the
/// only outward shape is `dto::PublicUser`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub refresh_tokens: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
