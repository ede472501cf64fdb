use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::middleware::auth::CurrentUser;

/// Composed after `require_auth`; rejects authenticated non-administrators.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    match req.extensions().get::<CurrentUser>() {
        Some(user) if user.is_admin => Ok(next.run(req).await),
        _ => Err(ApiError::Forbidden),
    }
}
