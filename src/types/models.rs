use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Micros, Millis, Role};

/// A local user mirroring a GitHub profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub github_id: i64,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile snapshot returned by the identity provider after a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub github_id: i64,
    pub handle: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo_id: Option<i64>,
    pub name: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated repository fields used to create or refresh a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInput {
    pub github_repo_id: Option<i64>,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
}

/// One immutable measurement submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub user_id: String,
    pub repository_id: String,
    pub energy_kwh: Micros,
    pub co2_kg: Micros,
    pub duration_s: Millis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated measurement ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub energy_kwh: Micros,
    pub co2_kg: Micros,
    pub duration_s: Millis,
    pub run_metadata: Option<serde_json::Value>,
    pub git_commit_sha: Option<String>,
    pub branch_name: Option<String>,
    pub workflow_name: Option<String>,
    pub repository: RepositoryInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Rollup over the runs of one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAggregate {
    pub total_co2_kg: Micros,
    pub avg_co2_kg: f64,
    pub total_energy_kwh: Micros,
    pub avg_energy_kwh: f64,
    pub run_count: i64,
    pub last_run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryWithStats {
    #[serde(flatten)]
    pub repository: Repository,
    pub owner: OwnerSummary,
    pub stats: RunAggregate,
}

/// Rollup over every run submitted by one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityStats {
    pub total_co2_kg: Micros,
    pub avg_co2_kg: f64,
    pub total_energy_kwh: Micros,
    pub avg_energy_kwh: f64,
    pub total_duration_s: Millis,
    pub run_count: i64,
    pub repository_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}
