use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::sms::{RecipientType, SmsStatus};
use crate::responses::FieldError;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub recipient_type: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFilter {
    pub created_by: Uuid,
    pub status: Option<SmsStatus>,
    pub recipient_type: Option<RecipientType>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound: midnight after the requested `to` day.
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

fn parse_day(errors: &mut Vec<FieldError>, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(day) => Some(day),
        Err(_) => {
            errors.push(FieldError::new(field, "Date must be in YYYY-MM-DD format"));
            None
        }
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

/// Escapes LIKE wildcards so the search term matches literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl HistoryFilter {
    pub fn from_query(created_by: Uuid, query: &HistoryQuery) -> Result<(Self, Page), Vec<FieldError>> {
        let mut errors = Vec::new();

        let status = match query.status.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            None => None,
            Some(raw) => raw
                .parse::<SmsStatus>()
                .map_err(|message| errors.push(FieldError::new("status", message)))
                .ok(),
        };

        let recipient_type = match query
            .recipient_type
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            None => None,
            Some(raw) => raw
                .parse::<RecipientType>()
                .map_err(|message| errors.push(FieldError::new("recipientType", message)))
                .ok(),
        };

        let from_day = parse_day(&mut errors, "from", query.from.as_deref());
        let to_day = parse_day(&mut errors, "to", query.to.as_deref());
        if let (Some(from), Some(to)) = (from_day, to_day) {
            if from > to {
                errors.push(FieldError::new("from", "Start date must be before end date"));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let page = Page {
            page: query.page.unwrap_or(1).max(1),
            limit: query
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        };

        Ok((
            Self {
                created_by,
                status,
                recipient_type,
                search,
                from: from_day.map(start_of),
                until: to_day.map(|day| start_of(day) + Duration::days(1)),
            },
            page,
        ))
    }

    /// Appends the WHERE clause for this filter to `builder`.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE created_by = ").push_bind(self.created_by);

        if let Some(status) = self.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(kind) = self.recipient_type {
            builder.push(" AND recipient_type = ").push_bind(kind.as_str());
        }
        if let Some(search) = &self.search {
            let pattern = format!("%{}%", escape_like(search));
            builder
                .push(" AND (message ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR recipient_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(from) = self.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(until) = self.until {
            builder.push(" AND created_at < ").push_bind(until);
        }
    }
}
