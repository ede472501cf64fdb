use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use sqlx::Row;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Identity attached to the request after the bearer token checks out and
/// the subject still exists.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_from_header(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".into()))?;
    let claims = state
        .jwt
        .verify(&token)
        .map_err(|_| ApiError::Unauthorized("Not authorized, token failed".into()))?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthorized("Not authorized, token failed".into()))?;

    // Store-unreachable surfaces as 503 here, not as a credential failure.
    let row = sqlx::query("SELECT id, email, is_admin FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;
    let row = row.ok_or_else(|| ApiError::Unauthorized("Not authorized, user not found".into()))?;

    req.extensions_mut().insert(CurrentUser {
        id: row.get("id"),
        email: row.get("email"),
        is_admin: row.get("is_admin"),
    });
    Ok(next.run(req).await)
}

fn bearer_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc.def.ghi".parse().unwrap(),
        );
        assert_eq!(bearer_from_header(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Basic dXNlcjpwYXNz".parse().unwrap(),
        );
        assert_eq!(bearer_from_header(&headers), None);
        assert_eq!(bearer_from_header(&HeaderMap::new()), None);
    }
}
