use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::Deserialize;
use sqlx::QueryBuilder;

use crate::domain::catalog::{PricingRule, PRICING_SCOPES};
use crate::error::ApiError;
use crate::infra::audit::{self, AuditEntry};
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::routes::query::{sort_column, sort_direction, Listing, ListQuery, Paged};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_rules).put(upsert_rule).delete(delete_rule))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth))
}

const PRICING_SORTS: &[(&str, &str)] = &[
    ("scope", "scope"),
    ("refId", "ref_id"),
    ("price", "price"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing<PricingRule>>, ApiError> {
    if let Some(scope) = query.scope.as_deref() {
        if !PRICING_SCOPES.contains(&scope) {
            return Err(ApiError::Validation(
                "scope must be service, brand or model".into(),
            ));
        }
    }
    let (from, to) = query.created_range()?;
    let term = query.search_term();

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(scope) = &query.scope {
            qb.push(" AND scope = ").push_bind(scope.clone());
        }
        if let Some(term) = &term {
            qb.push(" AND ref_id ILIKE ").push_bind(term.clone());
        }
        if let Some(from) = from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
    };

    let sort = sort_column(query.sort_by.as_deref(), PRICING_SORTS, "created_at");
    let dir = sort_direction(query.order.as_deref(), false);

    let mut select = QueryBuilder::new("SELECT * FROM pricing_rules WHERE TRUE");
    push_filters(&mut select);
    select.push(format!(" ORDER BY {sort} {dir}"));

    match query.paging() {
        None => {
            let items = select
                .build_query_as::<PricingRule>()
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
                .build_query_as::<PricingRule>()
                .fetch_all(&state.db)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM pricing_rules WHERE TRUE");
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
#[serde(rename_all = "camelCase")]
struct UpsertRuleRequest {
    scope: Option<String>,
    ref_id: Option<String>,
    price: Option<i64>,
    currency: Option<String>,
    metadata: Option<serde_json::Value>,
}

/// `(scope, refId)` is the natural key: update-if-exists-else-insert.
async fn upsert_rule(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(payload): Json<UpsertRuleRequest>,
) -> Result<Json<PricingRule>, ApiError> {
    let scope = payload.scope.as_deref().map(str::trim).unwrap_or("");
    let ref_id = payload.ref_id.as_deref().map(str::trim).unwrap_or("");
    let Some(price) = payload.price else {
        return Err(ApiError::Validation("scope, refId, price required".into()));
    };
    if scope.is_empty() || ref_id.is_empty() {
        return Err(ApiError::Validation("scope, refId, price required".into()));
    }
    if !PRICING_SCOPES.contains(&scope) {
        return Err(ApiError::Validation(
            "scope must be service, brand or model".into(),
        ));
    }
    let currency = payload
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("INR")
        .to_uppercase();
    let metadata = payload.metadata.unwrap_or_else(|| serde_json::json!({}));

    let rule = sqlx::query_as::<_, PricingRule>(
        "INSERT INTO pricing_rules (scope, ref_id, price, currency, metadata)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (scope, ref_id) DO UPDATE
             SET price = EXCLUDED.price,
                 currency = EXCLUDED.currency,
                 metadata = EXCLUDED.metadata,
                 updated_at = now()
         RETURNING *",
    )
    .bind(scope)
    .bind(ref_id)
    .bind(price)
    .bind(&currency)
    .bind(&metadata)
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "pricing.upsert",
            entity: "pricing_rule",
            entity_id: format!("{scope}:{ref_id}"),
            metadata: serde_json::json!({ "price": price, "currency": currency }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(rule))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRuleRequest {
    scope: Option<String>,
    ref_id: Option<String>,
}

async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(payload): Json<DeleteRuleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scope = payload.scope.as_deref().map(str::trim).unwrap_or("");
    let ref_id = payload.ref_id.as_deref().map(str::trim).unwrap_or("");
    if scope.is_empty() || ref_id.is_empty() {
        return Err(ApiError::Validation("scope, refId required".into()));
    }

    sqlx::query("DELETE FROM pricing_rules WHERE scope = $1 AND ref_id = $2")
        .bind(scope)
        .bind(ref_id)
        .execute(&state.db)
        .await?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "pricing.delete",
            entity: "pricing_rule",
            entity_id: format!("{scope}:{ref_id}"),
            metadata: serde_json::json!({}),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
