use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::domain::user::{UserPublic, PUBLIC_COLUMNS};
use crate::error::{is_unique_violation, ApiError};
use crate::infra::audit::{self, AuditEntry};
use crate::middleware::admin::require_admin;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::routes::query::{sort_column, sort_direction, Listing, ListQuery, Paged};
use crate::security::password;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/", post(register))
        .route("/login", post(login));

    let authed = Router::new()
        .route("/logout", post(logout))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/avatar", post(upload_avatar))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let admin = Router::new()
        .route("/", get(list_users))
        .route("/{id}/role", put(update_role))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    public.merge(authed).merge(admin)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    phone_number: Option<String>,
    address: Option<serde_json::Value>,
    vehicles: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(flatten)]
    user: UserPublic,
    token: String,
}

const MIN_PASSWORD_LEN: usize = 6;

fn valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() => {
            domain.split('.').count() >= 2 && domain.split('.').all(|seg| !seg.is_empty())
        }
        _ => false,
    }
}

fn valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.chars().all(|c| c.is_ascii_digit())
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let name = payload.name.as_deref().map(str::trim).unwrap_or("");
    let email = payload.email.as_deref().map(str::trim).unwrap_or("");
    let password_plain = payload.password.as_deref().unwrap_or("");
    let phone = payload.phone_number.as_deref().map(str::trim).unwrap_or("");

    if name.is_empty() || email.is_empty() || password_plain.is_empty() || phone.is_empty() {
        return Err(ApiError::Validation(
            "Please fill in all required fields".into(),
        ));
    }
    if !valid_email(email) {
        return Err(ApiError::Validation(
            "Please enter a valid email address".into(),
        ));
    }
    if !valid_phone(phone) {
        return Err(ApiError::Validation(
            "Please enter a valid 10-digit phone number".into(),
        ));
    }
    if password_plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }

    let email = email.to_lowercase();

    // Single combined duplicate lookup; the unique indexes close the race.
    let existing = sqlx::query("SELECT id FROM users WHERE lower(email) = $1 OR phone_number = $2")
        .bind(&email)
        .bind(phone)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Validation(
            "User already exists with this email or phone number".into(),
        ));
    }

    let hash = password::hash_password(password_plain)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    let address = payload.address.unwrap_or_else(|| serde_json::json!({}));
    let vehicles = payload.vehicles.unwrap_or_else(|| serde_json::json!([]));

    let inserted = sqlx::query_as::<_, UserPublic>(&format!(
        "INSERT INTO users (name, email, phone_number, password_hash, address, vehicles)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {PUBLIC_COLUMNS}"
    ))
    .bind(name)
    .bind(&email)
    .bind(phone)
    .bind(&hash)
    .bind(&address)
    .bind(&vehicles)
    .fetch_one(&state.db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::Validation("User already exists with this email or phone number".into())
        } else {
            err.into()
        }
    })?;

    let token = state
        .jwt
        .issue(&inserted.id.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: inserted,
            token,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = payload.email.as_deref().map(str::trim).unwrap_or("");
    let password_plain = payload.password.as_deref().unwrap_or("");
    if email.is_empty() || password_plain.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()));
    }

    // Missing user and wrong password produce the identical response.
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let row = sqlx::query(&format!(
        "SELECT {PUBLIC_COLUMNS}, password_hash FROM users WHERE lower(email) = $1"
    ))
    .bind(email.to_lowercase())
    .fetch_optional(&state.db)
    .await?;
    let row = row.ok_or_else(invalid)?;

    let stored_hash: String = row.get("password_hash");
    let matches = password::verify_password(password_plain, &stored_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    if !matches {
        return Err(invalid());
    }

    let user = UserPublic {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        address: row.get("address"),
        vehicles: row.get("vehicles"),
        is_admin: row.get("is_admin"),
        avatar_path: row.get("avatar_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    let token = state
        .jwt
        .issue(&user.id.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok(Json(AuthResponse { user, token }))
}

/// Tokens are bearer-only with a fixed expiry; the server keeps no session
/// state, so logout is the client discarding its token.
async fn logout() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Logged out successfully" }))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UserPublic>, ApiError> {
    let user = sqlx::query_as::<_, UserPublic>(&format!(
        "SELECT {PUBLIC_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(current.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    name: Option<String>,
    phone_number: Option<String>,
    address: Option<serde_json::Value>,
    vehicles: Option<serde_json::Value>,
    password: Option<String>,
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserPublic>, ApiError> {
    if let Some(phone) = payload.phone_number.as_deref() {
        if !valid_phone(phone) {
            return Err(ApiError::Validation(
                "Please enter a valid 10-digit phone number".into(),
            ));
        }
    }
    let password_hash = match payload.password.as_deref() {
        Some(plain) if plain.chars().count() < MIN_PASSWORD_LEN => {
            return Err(ApiError::Validation(
                "Password must be at least 6 characters long".into(),
            ))
        }
        Some(plain) => Some(
            password::hash_password(plain).map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?,
        ),
        None => None,
    };

    let updated = sqlx::query_as::<_, UserPublic>(&format!(
        "UPDATE users SET
             name = COALESCE($2, name),
             phone_number = COALESCE($3, phone_number),
             address = COALESCE($4, address),
             vehicles = COALESCE($5, vehicles),
             password_hash = COALESCE($6, password_hash),
             updated_at = now()
         WHERE id = $1
         RETURNING {PUBLIC_COLUMNS}"
    ))
    .bind(current.id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.phone_number.as_deref())
    .bind(payload.address)
    .bind(payload.vehicles)
    .bind(password_hash)
    .fetch_optional(&state.db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::Validation("Phone number is already in use".into())
        } else {
            ApiError::from(err)
        }
    })?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AvatarResponse {
    avatar_path: String,
}

/// Stores the uploaded image on disk under a deterministic per-user name and
/// persists the public path; the file is served statically from /uploads.
async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let mut stored: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("avatar") {
            continue;
        }
        let ext = field
            .file_name()
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "png".into());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid upload: {e}")))?;

        let filename = format!("avatar_{}.{ext}", current.id);
        let disk_path = state.config.uploads_dir.join(&filename);
        tokio::fs::write(&disk_path, &bytes)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to store avatar: {e}")))?;
        stored = Some(format!("/uploads/{filename}"));
        break;
    }

    let avatar_path =
        stored.ok_or_else(|| ApiError::Validation("avatar file field is required".into()))?;

    sqlx::query("UPDATE users SET avatar_path = $2, updated_at = now() WHERE id = $1")
        .bind(current.id)
        .bind(&avatar_path)
        .execute(&state.db)
        .await?;

    Ok(Json(AvatarResponse { avatar_path }))
}

const USER_SORTS: &[(&str, &str)] = &[
    ("name", "name"),
    ("email", "email"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("isAdmin", "is_admin"),
];

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Listing<UserPublic>>, ApiError> {
    let (from, to) = query.created_range()?;
    let term = query.search_term();

    let push_filters = |qb: &mut QueryBuilder<sqlx::Postgres>| {
        if let Some(term) = &term {
            qb.push(" AND (name ILIKE ")
                .push_bind(term.clone())
                .push(" OR email ILIKE ")
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

    let sort = sort_column(query.sort_by.as_deref(), USER_SORTS, "created_at");
    let dir = sort_direction(query.order.as_deref(), false);

    let mut select = QueryBuilder::new(format!(
        "SELECT {PUBLIC_COLUMNS} FROM users WHERE TRUE"
    ));
    push_filters(&mut select);
    select.push(format!(" ORDER BY {sort} {dir}"));

    match query.paging() {
        None => {
            let items = select
                .build_query_as::<UserPublic>()
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
                .build_query_as::<UserPublic>()
                .fetch_all(&state.db)
                .await?;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE TRUE");
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
struct RoleUpdateRequest {
    is_admin: Option<bool>,
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<RoleUpdateRequest>,
) -> Result<Json<UserPublic>, ApiError> {
    let is_admin = payload
        .is_admin
        .ok_or_else(|| ApiError::Validation("isAdmin is required".into()))?;

    let updated = sqlx::query_as::<_, UserPublic>(&format!(
        "UPDATE users SET is_admin = $2, updated_at = now() WHERE id = $1 RETURNING {PUBLIC_COLUMNS}"
    ))
    .bind(id)
    .bind(is_admin)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    audit::record(
        &state.db,
        AuditEntry {
            actor_id: Some(current.id),
            actor_email: Some(current.email.clone()),
            action: "user.role_update",
            entity: "user",
            entity_id: id.to_string(),
            metadata: serde_json::json!({ "isAdmin": is_admin }),
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
    fn email_validation_matches_the_registration_contract() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("a.b+c@sub.example.co"));
        assert!(!valid_email("userexample.com"));
        assert!(!valid_email("user@example"));
        assert!(!valid_email("user@@example.com"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@.com"));
        assert!(!valid_email("user@example."));
        assert!(!valid_email("us er@example.com"));
    }

    #[test]
    fn phone_must_be_exactly_ten_digits() {
        assert!(valid_phone("9876543210"));
        assert!(!valid_phone("987654321"));
        assert!(!valid_phone("98765432100"));
        assert!(!valid_phone("987654321a"));
        assert!(!valid_phone("+919876543"));
    }
}
