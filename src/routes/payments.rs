use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::payment::{PaymentOrderWithUser, STATUS_CREATED, STATUS_PAID};
use crate::error::ApiError;
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::routes::query::{sort_column, sort_direction, Listing, ListQuery, Paged};
use crate::security::signature::verify_signature;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/config", get(config));

    let authed = Router::new()
        .route("/create-order", post(create_order))
        .route("/verify", post(verify))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let admin = Router::new()
        .route("/", get(list_payments))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public.merge(authed).merge(admin)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    enabled: bool,
    key_id: Option<String>,
}

/// Reports whether the processor is configured so the client can toggle its
/// payment widget.
async fn config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        enabled: state.razorpay.is_configured(),
        key_id: state.razorpay.key_id().map(String::from),
    })
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    amount: Option<f64>,
    currency: Option<String>,
    receipt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    order_id: String,
    amount: i64,
    currency: String,
    key_id: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let amount = payload.amount.unwrap_or(0.0);
    if !(amount > 0.0) {
        return Err(ApiError::Validation("Amount is required (in paise)".into()));
    }
    let amount = amount.round() as i64;
    let currency = payload
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("INR")
        .to_uppercase();
    let receipt = payload
        .receipt
        .clone()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "rcpt_{}",
                OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
            )
        });

    // Minted by the processor first; a processor failure surfaces as 502
    // before anything is persisted.
    let order = state.razorpay.create_order(amount, &currency, &receipt).await?;
    let key_id = state
        .razorpay
        .key_id()
        .ok_or_else(|| {
            ApiError::Config(
                "Razorpay keys are not configured. Please set RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET".into(),
            )
        })?
        .to_string();

    sqlx::query(
        "INSERT INTO payments (user_id, order_id, amount, currency, receipt, status, meta)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(current.id)
    .bind(&order.id)
    .bind(order.amount)
    .bind(&order.currency)
    .bind(&order.receipt)
    .bind(STATUS_CREATED)
    .bind(serde_json::json!({ "notes": order.notes }))
    .execute(&state.db)
    .await?;

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        key_id,
    }))
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    razorpay_order_id: Option<String>,
    razorpay_payment_id: Option<String>,
    razorpay_signature: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    success: bool,
}

/// Settlement verification: recompute the HMAC over `order_id|payment_id`
/// and accept only an exact match, then mark the stored order paid. The
/// update is keyed on the external order id and is last-write-wins, so
/// re-verifying an already-paid order is a harmless no-op.
async fn verify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let (order_id, payment_id, signature) = match (
        payload.razorpay_order_id.as_deref().filter(|s| !s.is_empty()),
        payload.razorpay_payment_id.as_deref().filter(|s| !s.is_empty()),
        payload.razorpay_signature.as_deref().filter(|s| !s.is_empty()),
    ) {
        (Some(o), Some(p), Some(s)) => (o, p, s),
        _ => {
            return Err(ApiError::Validation(
                "Invalid payment verification payload".into(),
            ))
        }
    };

    let secret = state.razorpay.key_secret().ok_or_else(|| {
        ApiError::Config("Payment verification secret not configured".into())
    })?;

    if !verify_signature(secret, order_id, payment_id, signature) {
        return Err(ApiError::Validation("Payment verification failed".into()));
    }

    let result = sqlx::query(
        "UPDATE payments SET payment_id = $2, status = $3, updated_at = now() WHERE order_id = $1",
    )
    .bind(order_id)
    .bind(payment_id)
    .bind(STATUS_PAID)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        debug!("verified payment for unknown order id {order_id}");
    }

    Ok(Json(VerifyResponse { success: true }))
}

const PAYMENT_SORTS: &[(&str, &str)] = &[
    ("amount", "p.amount"),
    ("status", "p.status"),
    ("createdAt", "p.created_at"),
    ("updatedAt", "p.updated_at"),
];

const PAYMENT_STATUSES: &[&str] = &["created", "paid", "failed"];

async fn list_payments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing<PaymentOrderWithUser>>, ApiError> {
    if let Some(status) = query.status.as_deref() {
        if !PAYMENT_STATUSES.contains(&status) {
            return Err(ApiError::Validation("Invalid status".into()));
        }
    }
    let (from, to) = query.created_range()?;
    let term = query.search_term();

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(status) = &query.status {
            qb.push(" AND p.status = ").push_bind(status.clone());
        }
        if let Some(term) = &term {
            qb.push(" AND (p.order_id ILIKE ")
                .push_bind(term.clone())
                .push(" OR p.payment_id ILIKE ")
                .push_bind(term.clone())
                .push(" OR p.receipt ILIKE ")
                .push_bind(term.clone())
                .push(")");
        }
        if let Some(from) = from {
            qb.push(" AND p.created_at >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND p.created_at <= ").push_bind(to);
        }
    };

    let sort = sort_column(query.sort_by.as_deref(), PAYMENT_SORTS, "p.created_at");
    let dir = sort_direction(query.order.as_deref(), false);

    let mut select = QueryBuilder::new(
        "SELECT p.*, u.name AS user_name, u.email AS user_email
         FROM payments p JOIN users u ON u.id = p.user_id WHERE TRUE",
    );
    push_filters(&mut select);
    select.push(format!(" ORDER BY {sort} {dir}"));

    match query.paging() {
        None => {
            let items = select
                .build_query_as::<PaymentOrderWithUser>()
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
                .build_query_as::<PaymentOrderWithUser>()
                .fetch_all(&state.db)
                .await?;

            let mut count = QueryBuilder::new(
                "SELECT COUNT(*) FROM payments p JOIN users u ON u.id = p.user_id WHERE TRUE",
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
