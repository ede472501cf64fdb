use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// User row without the password hash; the only shape handlers return.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub address: serde_json::Value,
    pub vehicles: serde_json::Value,
    pub is_admin: bool,
    pub avatar_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Select list matching `UserPublic`, shared by every handler that returns it.
pub const PUBLIC_COLUMNS: &str =
    "id, name, email, phone_number, address, vehicles, is_admin, avatar_path, created_at, updated_at";
