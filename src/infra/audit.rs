use axum::http::HeaderMap;
use tracing::warn;
use uuid::Uuid;

use super::db::Db;

/// One action record. Actor fields are absent for unauthenticated callers.
#[derive(Debug)]
pub struct AuditEntry {
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: String,
    pub metadata: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Best-effort, detached append. A failed audit write is logged and
/// swallowed; the triggering business operation never observes it.
pub fn record(db: &Db, entry: AuditEntry) {
    let db = db.clone();
    tokio::spawn(async move {
        let res = sqlx::query(
            "INSERT INTO audit_logs (actor_id, actor_email, action, entity, entity_id, metadata, ip, user_agent)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.actor_id)
        .bind(&entry.actor_email)
        .bind(entry.action)
        .bind(entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.metadata)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .execute(&db)
        .await;
        if let Err(err) = res {
            warn!("audit log write failed: {err}");
        }
    });
}

pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn client_ip_absent_without_header() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
