use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use serde::Deserialize;
use sqlx::QueryBuilder;

use crate::domain::audit::AuditLog;
use crate::error::ApiError;
use crate::middleware::admin::require_admin;
use crate::middleware::auth::require_auth;
use crate::routes::query::{Listing, ListQuery, Paged};
use crate::state::AppState;

/// Unpaginated audit reads are capped; the log grows without bound.
const UNPAGED_CAP: i64 = 500;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_audit))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth))
}

#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    entity: Option<String>,
    action: Option<String>,
    actor: Option<String>,
    from: Option<String>,
    to: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Listing<AuditLog>>, ApiError> {
    // Reuse the shared range/paging semantics for the audit-specific shape.
    let common = ListQuery {
        from: query.from.clone(),
        to: query.to.clone(),
        page: query.page,
        limit: query.limit,
        ..Default::default()
    };
    let (from, to) = common.created_range()?;

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(entity) = &query.entity {
            qb.push(" AND entity = ").push_bind(entity.clone());
        }
        if let Some(action) = &query.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(actor) = &query.actor {
            qb.push(" AND (actor_email ILIKE ")
                .push_bind(format!("%{actor}%"))
                .push(" OR actor_id::text = ")
                .push_bind(actor.clone())
                .push(")");
        }
        if let Some(from) = from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
    };

    let mut select = QueryBuilder::new("SELECT * FROM audit_logs WHERE TRUE");
    push_filters(&mut select);
    select.push(" ORDER BY created_at DESC");

    match common.paging() {
        None => {
            select.push(" LIMIT ").push_bind(UNPAGED_CAP);
            let items = select
                .build_query_as::<AuditLog>()
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
                .build_query_as::<AuditLog>()
                .fetch_all(&state.db)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs WHERE TRUE");
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
