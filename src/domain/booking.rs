use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub vehicle_type: String,
    pub vehicle_model: String,
    pub service_type: String,
    pub date: Date,
    pub time_slot: String,
    pub address: String,
    pub notes: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Admin listing row: booking plus the owning user's display fields.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithUser {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub booking: Booking,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Upcoming,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Upcoming => "upcoming",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(BookingStatus::Upcoming),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_is_exact() {
        assert_eq!(BookingStatus::parse("upcoming"), Some(BookingStatus::Upcoming));
        assert_eq!(BookingStatus::parse("completed"), Some(BookingStatus::Completed));
        assert_eq!(BookingStatus::parse("cancelled"), Some(BookingStatus::Cancelled));
        assert_eq!(BookingStatus::parse("Cancelled"), None);
        assert_eq!(BookingStatus::parse("done"), None);
    }
}
