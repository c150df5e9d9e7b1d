//! Turns raw path and query parameters into typed store queries.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use super::dto::{ListReposParams, ListRunsParams, PaginationParams};
use crate::server::response::ApiError;
use crate::types::{PageRequest, RepositoryQuery, RunQuery, SortField, SortOrder};

const MAX_FILTER_LEN: usize = 255;

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Ids are UUIDs; anything else is rejected before the store is queried.
pub fn parse_id(raw: &str, entity: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::invalid_id(format!("Invalid {entity} id")))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date
/// covers the whole day: its first instant as a lower bound, its last as an
/// upper bound.
fn parse_date(raw: &str, field: &str, bound: Bound) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::bad_request(format!(
            "{field} must be an RFC 3339 timestamp or a YYYY-MM-DD date"
        ))
    })?;

    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN),
    };
    Ok(date.and_time(time).and_utc())
}

fn filter(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.len() > MAX_FILTER_LEN {
        return Err(ApiError::bad_request(format!(
            "{field} cannot exceed {MAX_FILTER_LEN} characters"
        )));
    }
    Ok(Some(value))
}

pub fn page_request(params: &PaginationParams, max_limit: u32) -> PageRequest {
    PageRequest::new(params.page, params.limit, max_limit)
}

pub fn repository_query(params: ListReposParams, max_limit: u32) -> Result<RepositoryQuery, ApiError> {
    let sort = match params.sort.as_deref() {
        None | Some("") => SortField::default(),
        Some(raw) => raw.parse().map_err(ApiError::bad_request)?,
    };
    let order = match params.order.as_deref() {
        None | Some("") => SortOrder::default(),
        Some(raw) => raw.parse().map_err(ApiError::bad_request)?,
    };

    Ok(RepositoryQuery {
        page: PageRequest::new(params.page, params.limit, max_limit),
        sort,
        order,
        owner: filter(params.owner, "owner")?,
        name_contains: filter(params.name, "name")?,
    })
}

pub fn run_query(params: ListRunsParams, max_limit: u32) -> Result<RunQuery, ApiError> {
    let repository_id = params
        .repository_id
        .filter(|id| !id.is_empty())
        .map(|id| parse_id(&id, "repository"))
        .transpose()?;

    let from = params
        .from_date
        .filter(|d| !d.is_empty())
        .map(|d| parse_date(&d, "from_date", Bound::Start))
        .transpose()?;
    let to = params
        .to_date
        .filter(|d| !d.is_empty())
        .map(|d| parse_date(&d, "to_date", Bound::End))
        .transpose()?;

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ApiError::bad_request("from_date must not be after to_date"));
        }
    }

    Ok(RunQuery {
        page: PageRequest::new(params.page, params.limit, max_limit),
        repository_id,
        from,
        to,
    })
}
