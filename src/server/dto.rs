use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Identity, Role};

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Query string of `GET /repos`. Sort and order stay strings here so that an
/// unknown value is reported instead of silently ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ListReposParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub owner: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRunsParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub repository_id: Option<String>,
    #[serde(alias = "from")]
    pub from_date: Option<String>,
    #[serde(alias = "to")]
    pub to_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Identity,
    pub expires_at: DateTime<Utc>,
}
