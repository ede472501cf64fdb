use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::Deserialize;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::domain::catalog::{Brand, BRAND_TYPES};
use crate::error::{is_unique_violation, ApiError};
use crate::infra::audit::{self, AuditEntry};
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::routes::query::{sort_column, sort_direction, Listing, ListQuery, Paged};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/", get(list_brands));

    let admin = Router::new()
        .route("/", post(create_brand))
        .route("/{id}", put(update_brand).delete(delete_brand))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public.merge(admin)
}

const BRAND_SORTS: &[(&str, &str)] = &[
    ("name", "name"),
    ("type", "type"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

async fn list_brands(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing<Brand>>, ApiError> {
    if let Some(kind) = query.kind.as_deref() {
        if !BRAND_TYPES.contains(&kind) {
            return Err(ApiError::Validation("type must be car or bike".into()));
        }
    }
    let (from, to) = query.created_range()?;
    let term = query.search_term();

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(kind) = &query.kind {
            qb.push(" AND type = ").push_bind(kind.clone());
        }
        if let Some(term) = &term {
            qb.push(" AND (name ILIKE ")
                .push_bind(term.clone())
                .push(" OR slug ILIKE ")
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

    // Brand listings read naturally name-first.
    let sort = sort_column(query.sort_by.as_deref(), BRAND_SORTS, "name");
    let dir = sort_direction(query.order.as_deref(), true);

    let mut select = QueryBuilder::new("SELECT * FROM brands WHERE TRUE");
    push_filters(&mut select);
    select.push(format!(" ORDER BY {sort} {dir}"));

    match query.paging() {
        None => {
            let items = select.build_query_as::<Brand>().fetch_all(&state.db).await?;
            Ok(Json(Listing::Plain(items)))
        }
        Some((page, limit)) => {
            select
                .push(" LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind((page - 1) * limit);
            let items = select.build_query_as::<Brand>().fetch_all(&state.db).await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM brands WHERE TRUE");
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
struct CreateBrandRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    slug: Option<String>,
    logo: Option<String>,
    models: Option<serde_json::Value>,
}

async fn create_brand(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(payload): Json<CreateBrandRequest>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    let kind = payload.kind.as_deref().map(str::trim).unwrap_or("");
    let name = payload.name.as_deref().map(str::trim).unwrap_or("");
    let slug = payload.slug.as_deref().map(str::trim).unwrap_or("");
    if kind.is_empty() || name.is_empty() || slug.is_empty() {
        return Err(ApiError::Validation("type, name, slug are required".into()));
    }
    if !BRAND_TYPES.contains(&kind) {
        return Err(ApiError::Validation("type must be car or bike".into()));
    }
    let slug = slug.to_lowercase();
    let models = payload.models.unwrap_or_else(|| serde_json::json!([]));

    let created = sqlx::query_as::<_, Brand>(
        "INSERT INTO brands (type, name, slug, logo, models)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(kind)
    .bind(name)
    .bind(&slug)
    .bind(payload.logo.as_deref().unwrap_or(""))
    .bind(&models)
    .fetch_one(&state.db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::Validation(format!("Brand slug '{slug}' already exists"))
        } else {
            err.into()
        }
    })?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "brand.create",
            entity: "brand",
            entity_id: created.id.to_string(),
            metadata: serde_json::json!({ "slug": created.slug }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBrandRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    slug: Option<String>,
    logo: Option<String>,
    models: Option<serde_json::Value>,
}

async fn update_brand(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBrandRequest>,
) -> Result<Json<Brand>, ApiError> {
    if let Some(kind) = payload.kind.as_deref() {
        if !BRAND_TYPES.contains(&kind) {
            return Err(ApiError::Validation("type must be car or bike".into()));
        }
    }
    let slug = payload.slug.as_deref().map(|s| s.trim().to_lowercase());

    let updated = sqlx::query_as::<_, Brand>(
        "UPDATE brands SET
             type = COALESCE($2, type),
             name = COALESCE($3, name),
             slug = COALESCE($4, slug),
             logo = COALESCE($5, logo),
             models = COALESCE($6, models),
             updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(payload.kind.as_deref())
    .bind(payload.name.as_deref().map(str::trim))
    .bind(slug.as_deref())
    .bind(payload.logo.as_deref())
    .bind(payload.models)
    .fetch_optional(&state.db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::Validation("Brand slug already exists".into())
        } else {
            ApiError::from(err)
        }
    })?
    .ok_or_else(|| ApiError::NotFound("Brand not found".into()))?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "brand.update",
            entity: "brand",
            entity_id: id.to_string(),
            metadata: serde_json::json!({ "slug": updated.slug }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(updated))
}

async fn delete_brand(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("DELETE FROM brands WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Brand not found".into()));
    }

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "brand.delete",
            entity: "brand",
            entity_id: id.to_string(),
            metadata: serde_json::json!({}),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
