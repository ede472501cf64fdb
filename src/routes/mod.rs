use std::sync::Arc;

use axum::extract::State;
use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::infra::db;
use crate::state::AppState;

mod audit;
mod bookings;
mod brands;
mod cms;
mod payments;
mod pricing;
pub mod query;
mod services;
mod users;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/users", users::router(state.clone()))
        .nest("/bookings", bookings::router(state.clone()))
        .nest("/payments", payments::router(state.clone()))
        .nest("/services", services::router(state.clone()))
        .nest("/brands", brands::router(state.clone()))
        .nest("/pricing", pricing::router(state.clone()))
        .nest("/cms", cms::router(state.clone()))
        .nest("/audit", audit::router(state.clone()));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .nest_service(
            "/uploads",
            ServeDir::new(&state.config.uploads_dir).not_found_service(not_found.into_service()),
        )
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = if db::is_healthy(&state.db).await {
        "up"
    } else {
        "down"
    };
    Json(HealthResponse {
        status: "ok",
        database,
    })
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "message": "The resource you're looking for doesn't exist."
        })),
    )
}
