use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time};

use crate::error::ApiError;

pub const MAX_PAGE_SIZE: i64 = 200;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Common list-endpoint query string. Routes ignore the fields that do not
/// apply to their entity.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub scope: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListQuery {
    /// `Some((page, limit))` when the caller asked for paging; both values
    /// clamped (page ≥ 1, limit within [1, 200]). `None` keeps the legacy
    /// full-result behavior.
    pub fn paging(&self) -> Option<(i64, i64)> {
        if self.page.is_none() && self.limit.is_none() {
            return None;
        }
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Some((page, limit))
    }

    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"))
    }

    /// Inclusive creation-date range; date-only bounds land on midnight UTC.
    pub fn created_range(
        &self,
    ) -> Result<(Option<OffsetDateTime>, Option<OffsetDateTime>), ApiError> {
        let from = self.from.as_deref().map(parse_moment).transpose()?;
        let to = self.to.as_deref().map(parse_moment).transpose()?;
        Ok((from, to))
    }
}

/// Resolve `sortBy` against an allowlist of `(query name, column)` pairs.
/// Anything outside the list falls back to the default column; never an
/// error and never interpolated from raw input.
pub fn sort_column<'a>(
    requested: Option<&str>,
    allowed: &[(&str, &'a str)],
    default: &'a str,
) -> &'a str {
    requested
        .and_then(|name| {
            allowed
                .iter()
                .find(|(query_name, _)| *query_name == name)
                .map(|(_, column)| *column)
        })
        .unwrap_or(default)
}

pub fn sort_direction(order: Option<&str>, default_asc: bool) -> &'static str {
    match order.map(str::to_ascii_lowercase).as_deref() {
        Some("asc") => "ASC",
        Some("desc") => "DESC",
        _ if default_asc => "ASC",
        _ => "DESC",
    }
}

fn parse_moment(raw: &str) -> Result<OffsetDateTime, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(raw, &date_only) {
        return Ok(date.with_time(Time::MIDNIGHT).assume_utc());
    }
    Err(ApiError::Validation(format!("Invalid date: {raw}")))
}

/// Paged response envelope, mirrored by every list endpoint that received
/// `page`/`limit`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// List endpoints answer either a plain array (no paging requested) or the
/// paged envelope.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Paged(Paged<T>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<i64>, limit: Option<i64>) -> ListQuery {
        ListQuery {
            page,
            limit,
            ..Default::default()
        }
    }

    #[test]
    fn absent_paging_keeps_full_results() {
        assert_eq!(query(None, None).paging(), None);
    }

    #[test]
    fn oversized_limit_is_clamped_to_max() {
        assert_eq!(query(Some(1), Some(500)).paging(), Some((1, 200)));
    }

    #[test]
    fn zero_or_negative_page_is_clamped_to_one() {
        assert_eq!(query(Some(0), Some(10)).paging(), Some((1, 10)));
        assert_eq!(query(Some(-3), Some(10)).paging(), Some((1, 10)));
        assert_eq!(query(Some(2), Some(0)).paging(), Some((2, 1)));
    }

    #[test]
    fn limit_alone_implies_first_page() {
        assert_eq!(query(None, Some(50)).paging(), Some((1, 50)));
        assert_eq!(query(Some(3), None).paging(), Some((3, DEFAULT_PAGE_SIZE)));
    }

    #[test]
    fn sort_outside_allowlist_falls_back_to_default() {
        let allowed = [("name", "name"), ("createdAt", "created_at")];
        assert_eq!(sort_column(Some("name"), &allowed, "created_at"), "name");
        assert_eq!(
            sort_column(Some("createdAt"), &allowed, "created_at"),
            "created_at"
        );
        assert_eq!(
            sort_column(Some("__proto__"), &allowed, "created_at"),
            "created_at"
        );
        assert_eq!(
            sort_column(Some("password_hash; DROP TABLE users"), &allowed, "created_at"),
            "created_at"
        );
        assert_eq!(sort_column(None, &allowed, "created_at"), "created_at");
    }

    #[test]
    fn sort_direction_defaults() {
        assert_eq!(sort_direction(Some("asc"), false), "ASC");
        assert_eq!(sort_direction(Some("DESC"), true), "DESC");
        assert_eq!(sort_direction(Some("sideways"), false), "DESC");
        assert_eq!(sort_direction(None, true), "ASC");
    }

    #[test]
    fn date_range_accepts_day_and_rfc3339_bounds() {
        let q = ListQuery {
            from: Some("2026-01-15".into()),
            to: Some("2026-02-01T10:30:00Z".into()),
            ..Default::default()
        };
        let (from, to) = q.created_range().expect("range");
        let from = from.expect("from");
        let to = to.expect("to");
        assert_eq!(from.date().to_string(), "2026-01-15");
        assert_eq!(from.time(), Time::MIDNIGHT);
        assert_eq!(to.hour(), 10);
    }

    #[test]
    fn bad_date_is_a_validation_error() {
        let q = ListQuery {
            from: Some("next tuesday".into()),
            ..Default::default()
        };
        assert!(matches!(
            q.created_range(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn blank_search_is_ignored() {
        let q = ListQuery {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(q.search_term(), None);
        let q = ListQuery {
            search: Some("honda".into()),
            ..Default::default()
        };
        assert_eq!(q.search_term().as_deref(), Some("%honda%"));
    }
}
