use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Local mirror of a processor order. `status` is one of
/// created | paid | failed; only the verified-settlement path writes "paid".
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub meta: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrderWithUser {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub payment: PaymentOrder,
    pub user_name: String,
    pub user_email: String,
}

pub const STATUS_CREATED: &str = "created";
pub const STATUS_PAID: &str = "paid";
