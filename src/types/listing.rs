use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sort keys accepted by the repository listing. Each key maps to a fixed
/// ordering expression; nothing from the request reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    TotalEmissions,
    AvgEmissions,
    RunCount,
    LastRun,
}

impl SortField {
    #[must_use]
    pub const fn order_expr(self) -> &'static str {
        match self {
            Self::TotalEmissions => "total_co2",
            Self::AvgEmissions => "avg_co2",
            Self::RunCount => "run_count",
            Self::LastRun => "last_run_at",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total_emissions" | "total_co2" => Ok(Self::TotalEmissions),
            "avg_emissions" | "avg_co2" => Ok(Self::AvgEmissions),
            "run_count" => Ok(Self::RunCount),
            "last_run" => Ok(Self::LastRun),
            other => Err(format!(
                "unknown sort field '{other}', expected one of total_emissions, avg_emissions, run_count, last_run"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("unknown sort order '{s}', expected asc or desc")),
        }
    }
}

/// A 1-based page request whose size has already been clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Out-of-range pages start at 1; a zero or missing limit falls back to the
    /// default and anything above `max_limit` is clamped to it.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>, max_limit: u32) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = match limit {
            Some(0) | None => Self::DEFAULT_LIMIT.min(max_limit),
            Some(l) => l.min(max_limit),
        };
        Self { page, limit: limit.max(1) }
    }

    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryQuery {
    pub page: PageRequest,
    pub sort: SortField,
    pub order: SortOrder,
    /// Exact (case-insensitive) owner handle.
    pub owner: Option<String>,
    /// Substring match on the repository name.
    pub name_contains: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub page: PageRequest,
    pub repository_id: Option<String>,
    /// Inclusive lower bound on creation time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time.
    pub to: Option<DateTime<Utc>>,
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    #[must_use]
    pub fn new(request: PageRequest, total: i64) -> Self {
        let limit = i64::from(request.limit);
        let pages = (total + limit - 1) / limit;
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages,
            has_next: i64::from(request.page) < pages,
            has_prev: request.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_aliases() {
        assert_eq!("total_co2".parse(), Ok(SortField::TotalEmissions));
        assert_eq!("avg_emissions".parse(), Ok(SortField::AvgEmissions));
        assert_eq!("last_run".parse(), Ok(SortField::LastRun));
        assert!("name; DROP TABLE runs".parse::<SortField>().is_err());
    }

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(PageRequest::new(None, None, 100), PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some(0), Some(500), 100), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(2), 100).offset(), 4);
    }

    #[test]
    fn test_page_info() {
        let info = PageInfo::new(PageRequest { page: 3, limit: 2 }, 5);
        assert_eq!(info.pages, 3);
        assert!(!info.has_next);
        assert!(info.has_prev);

        let empty = PageInfo::new(PageRequest::default(), 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next);
    }
}
