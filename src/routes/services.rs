use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::Deserialize;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::domain::catalog::Service;
use crate::error::ApiError;
use crate::infra::audit::{self, AuditEntry};
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::routes::query::{sort_column, sort_direction, Listing, ListQuery, Paged};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/", get(list_services));

    let admin = Router::new()
        .route("/", post(create_service))
        .route("/{id}", put(update_service).delete(delete_service))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public.merge(admin)
}

const SERVICE_SORTS: &[(&str, &str)] = &[
    ("title", "title"),
    ("price", "price"),
    ("category", "category"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

async fn list_services(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing<Service>>, ApiError> {
    let (from, to) = query.created_range()?;
    let term = query.search_term();

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(category) = &query.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(term) = &term {
            qb.push(" AND (title ILIKE ")
                .push_bind(term.clone())
                .push(" OR description ILIKE ")
                .push_bind(term.clone())
                .push(")");
        }
        if let Some(from) = from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
    };

    let sort = sort_column(query.sort_by.as_deref(), SERVICE_SORTS, "created_at");
    let dir = sort_direction(query.order.as_deref(), false);

    let mut select = QueryBuilder::new("SELECT * FROM services WHERE TRUE");
    push_filters(&mut select);
    select.push(format!(" ORDER BY {sort} {dir}"));

    match query.paging() {
        None => {
            let items = select
                .build_query_as::<Service>()
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
                .build_query_as::<Service>()
                .fetch_all(&state.db)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM services WHERE TRUE");
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
struct CreateServiceRequest {
    title: Option<String>,
    description: Option<String>,
    how_it_works: Option<String>,
    image: Option<String>,
    price: Option<i64>,
    category: Option<String>,
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let title = payload.title.as_deref().map(str::trim).unwrap_or("");
    let description = payload.description.as_deref().map(str::trim).unwrap_or("");
    let category = payload.category.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() || description.is_empty() || category.is_empty() {
        return Err(ApiError::Validation(
            "title, description and category are required".into(),
        ));
    }
    let price = payload
        .price
        .ok_or_else(|| ApiError::Validation("price is required".into()))?;

    let created = sqlx::query_as::<_, Service>(
        "INSERT INTO services (title, description, how_it_works, image, price, category)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(title)
    .bind(description)
    .bind(payload.how_it_works.as_deref())
    .bind(payload.image.as_deref())
    .bind(price)
    .bind(category)
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "service.create",
            entity: "service",
            entity_id: created.id.to_string(),
            metadata: serde_json::json!({ "title": created.title }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateServiceRequest {
    title: Option<String>,
    description: Option<String>,
    how_it_works: Option<String>,
    image: Option<String>,
    price: Option<i64>,
    category: Option<String>,
}

async fn update_service(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateServiceRequest>,
) -> Result<Json<Service>, ApiError> {
    let updated = sqlx::query_as::<_, Service>(
        "UPDATE services SET
             title = COALESCE($2, title),
             description = COALESCE($3, description),
             how_it_works = COALESCE($4, how_it_works),
             image = COALESCE($5, image),
             price = COALESCE($6, price),
             category = COALESCE($7, category),
             updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(payload.description.as_deref())
    .bind(payload.how_it_works.as_deref())
    .bind(payload.image.as_deref())
    .bind(payload.price)
    .bind(payload.category.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Service not found".into()))?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "service.update",
            entity: "service",
            entity_id: id.to_string(),
            metadata: serde_json::json!({ "title": updated.title }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(updated))
}

async fn delete_service(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("DELETE FROM services WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Service not found".into()));
    }

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "service.delete",
            entity: "service",
            entity_id: id.to_string(),
            metadata: serde_json::json!({}),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
