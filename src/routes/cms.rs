use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::Deserialize;
use sqlx::Row;

use crate::error::ApiError;
use crate::infra::audit::{self, AuditEntry};
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/{key}", get(get_content));

    let admin = Router::new()
        .route("/{key}", axum::routing::put(set_content))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public.merge(admin)
}

/// Returns the stored JSON value for a key, or `null` when unset.
async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let row = sqlx::query("SELECT value FROM cms_contents WHERE key = $1")
        .bind(&key)
        .fetch_optional(&state.db)
        .await?;
    let value = row
        .map(|r| r.get::<serde_json::Value, _>("value"))
        .unwrap_or(serde_json::Value::Null);
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
struct SetContentRequest {
    value: Option<serde_json::Value>,
}

async fn set_content(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SetContentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let value = payload
        .value
        .ok_or_else(|| ApiError::Validation("value is required".into()))?;

    let stored = sqlx::query(
        "INSERT INTO cms_contents (key, value)
         VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
         RETURNING value",
    )
    .bind(&key)
    .bind(&value)
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "cms.update",
            entity: "cms_content",
            entity_id: key.clone(),
            metadata: serde_json::json!({ "key": key }),
            ip: audit::client_ip(&headers),
            user_agent: audit::user_agent(&headers),
        },
    );

    Ok(Json(stored.get::<serde_json::Value, _>("value")))
}
