use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::{ListReposParams, ListRunsParams};
use crate::server::response::{
    ApiError, ApiResponse, PaginatedResponse, StoreOptionExt, StoreResultExt,
};
use crate::server::validation::{parse_id, repository_query, run_query};
use crate::types::Capability;

/// Repositories with at least one run, with their emission statistics.
pub async fn list_repos(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListReposParams>, QueryRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ReadStatistics)?;
    let Query(params) = params?;
    let query = repository_query(params, state.config.max_page_size)?;

    let page = state
        .store
        .list_repositories_with_stats(&query)
        .api_err("Failed to list repositories")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(page, query.page)))
}

pub async fn get_repo(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ReadStatistics)?;
    let Path(id) = path?;
    let id = parse_id(&id, "repository")?;

    let repo = state
        .store
        .get_repository_with_stats(&id)
        .api_err("Failed to get repository")?
        .or_not_found("Repository not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(repo)))
}

/// Owners only. Removes the repository's runs as well.
pub async fn delete_repo(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ManageOwnData)?;
    let Path(id) = path?;
    let id = parse_id(&id, "repository")?;

    let repo = state
        .store
        .get_repository(&id)
        .api_err("Failed to get repository")?
        .or_not_found("Repository not found")?;

    if repo.owner_id != auth.identity.id {
        return Err(ApiError::forbidden("Only the owner can delete this repository"));
    }

    let deleted = state
        .store
        .delete_repository(&id, &auth.identity.id)
        .api_err("Failed to delete repository")?;

    if !deleted {
        return Err(ApiError::not_found("Repository not found"));
    }

    tracing::info!(repository = %repo.full_name, user_id = %auth.identity.id, "Repository deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs of one repository, newest first. `repository_id` in the query string
/// is ignored in favor of the path.
pub async fn list_repo_runs(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    params: Result<Query<ListRunsParams>, QueryRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ReadStatistics)?;
    let Path(id) = path?;
    let id = parse_id(&id, "repository")?;
    let Query(params) = params?;
    let query = run_query(
        ListRunsParams {
            repository_id: None,
            ..params
        },
        state.config.max_page_size,
    )?;

    let page = state
        .store
        .list_repository_runs(&id, &query)
        .api_err("Failed to list repository runs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(page, query.page)))
}
