use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::Deserialize;
use sqlx::QueryBuilder;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::booking::{Booking, BookingStatus, BookingWithUser};
use crate::error::ApiError;
use crate::infra::audit::{self, AuditEntry};
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::routes::query::{sort_column, sort_direction, Listing, ListQuery, Paged};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authed = Router::new()
        .route("/", post(create_booking))
        .route("/my", get(my_bookings))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let admin = Router::new()
        .route("/", get(list_bookings))
        .route("/{id}/status", put(update_status))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    authed.merge(admin)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingRequest {
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    vehicle_type: Option<String>,
    vehicle_model: Option<String>,
    service_type: Option<String>,
    date: Option<String>,
    time_slot: Option<String>,
    address: Option<String>,
    notes: Option<String>,
}

fn parse_booking_date(raw: &str) -> Result<Date, ApiError> {
    let raw = raw.trim();
    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(raw, &date_only) {
        return Ok(date);
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts.date());
    }
    Err(ApiError::Validation(format!("Invalid booking date: {raw}")))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let required = [
        &payload.name,
        &payload.phone,
        &payload.email,
        &payload.vehicle_type,
        &payload.vehicle_model,
        &payload.service_type,
        &payload.date,
        &payload.time_slot,
        &payload.address,
    ];
    if required
        .iter()
        .any(|field| field.as_deref().map(str::trim).unwrap_or("").is_empty())
    {
        return Err(ApiError::Validation("Missing required booking fields".into()));
    }

    let date = parse_booking_date(payload.date.as_deref().unwrap_or(""))?;

    let booking = sqlx::query_as::<_, Booking>(
        "INSERT INTO bookings
             (user_id, name, phone_number, email, vehicle_type, vehicle_model, service_type, date, time_slot, address, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING *",
    )
    .bind(current.id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.phone.as_deref().map(str::trim))
    .bind(payload.email.as_deref().map(|s| s.trim().to_lowercase()))
    .bind(payload.vehicle_type.as_deref())
    .bind(payload.vehicle_model.as_deref())
    .bind(payload.service_type.as_deref())
    .bind(date)
    .bind(payload.time_slot.as_deref())
    .bind(payload.address.as_deref())
    .bind(payload.notes.as_deref())
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

async fn my_bookings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(current.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(bookings))
}

const BOOKING_SORTS: &[(&str, &str)] = &[
    ("date", "b.date"),
    ("status", "b.status"),
    ("createdAt", "b.created_at"),
    ("updatedAt", "b.updated_at"),
];

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing<BookingWithUser>>, ApiError> {
    if let Some(status) = query.status.as_deref() {
        if BookingStatus::parse(status).is_none() {
            return Err(ApiError::Validation("Invalid status".into()));
        }
    }
    let (from, to) = query.created_range()?;
    let term = query.search_term();

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(status) = &query.status {
            qb.push(" AND b.status = ").push_bind(status.clone());
        }
        if let Some(term) = &term {
            qb.push(" AND (b.name ILIKE ")
                .push_bind(term.clone())
                .push(" OR b.email ILIKE ")
                .push_bind(term.clone())
                .push(" OR b.phone_number ILIKE ")
                .push_bind(term.clone())
                .push(")");
        }
        if let Some(from) = from {
            qb.push(" AND b.created_at >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND b.created_at <= ").push_bind(to);
        }
    };

    let sort = sort_column(query.sort_by.as_deref(), BOOKING_SORTS, "b.created_at");
    let dir = sort_direction(query.order.as_deref(), false);

    let mut select = QueryBuilder::new(
        "SELECT b.*, u.name AS user_name, u.email AS user_email
         FROM bookings b JOIN users u ON u.id = b.user_id WHERE TRUE",
    );
    push_filters(&mut select);
    select.push(format!(" ORDER BY {sort} {dir}"));

    match query.paging() {
        None => {
            let items = select
                .build_query_as::<BookingWithUser>()
                .fetch_all(&state.db)
                .await?;
            Ok(Json(Listing::Plain(items)))
        }
        Some((page, limit)) => {
            select
                .push(" LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind((page - 1) * limit);
            let items = select
                .build_query_as::<BookingWithUser>()
                .fetch_all(&state.db)
                .await?;

            let mut count = QueryBuilder::new(
                "SELECT COUNT(*) FROM bookings b JOIN users u ON u.id = b.user_id WHERE TRUE",
            );
            push_filters(&mut count);
            let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

            Ok(Json(Listing::Paged(Paged {
                items,
                total,
                page,
                limit,
            })))
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    status: Option<String>,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<Booking>, ApiError> {
    let status = payload
        .status
        .as_deref()
        .and_then(BookingStatus::parse)
        .ok_or_else(|| ApiError::Validation("Invalid status".into()))?;

    let updated = sqlx::query_as::<_, Booking>(
        "UPDATE bookings SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Booking not found".into()))?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "booking.status_update",
            entity: "booking",
            entity_id: id.to_string(),
            metadata: serde_json::json!({ "status": status.as_str() }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_date_accepts_day_and_rfc3339_forms() {
        assert_eq!(
            parse_booking_date("2026-08-20").expect("date").to_string(),
            "2026-08-20"
        );
        assert_eq!(
            parse_booking_date("2026-08-20T09:30:00Z")
                .expect("date")
                .to_string(),
            "2026-08-20"
        );
        assert!(parse_booking_date("20/08/2026").is_err());
        assert!(parse_booking_date("").is_err());
    }
}
