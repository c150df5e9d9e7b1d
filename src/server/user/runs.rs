use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::ingest::{self, RunSubmission};
use crate::server::AppState;
use crate::server::dto::ListRunsParams;
use crate::server::response::{
    ApiError, ApiResponse, PaginatedResponse, StoreOptionExt, StoreResultExt,
};
use crate::server::validation::{parse_id, run_query};
use crate::types::Capability;

pub async fn create_run(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    body: Result<Json<RunSubmission>, JsonRejection>,
) -> impl IntoResponse {
    auth.require(Capability::SubmitRuns)?;
    let Json(submission) = body?;

    let run = ingest::submit(state.store.as_ref(), &auth.identity.id, submission)
        .api_err("Failed to record run")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(run))))
}

/// The caller's own runs, newest first.
pub async fn list_runs(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListRunsParams>, QueryRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ReadStatistics)?;
    let Query(params) = params?;
    let query = run_query(params, state.config.max_page_size)?;

    let page = state
        .store
        .list_identity_runs(&auth.identity.id, &query)
        .api_err("Failed to list runs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(page, query.page)))
}

pub async fn get_run(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ReadStatistics)?;
    let Path(id) = path?;
    let id = parse_id(&id, "run")?;

    let run = state
        .store
        .get_run(&id)
        .api_err("Failed to get run")?
        .or_not_found("Run not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(run)))
}

pub async fn delete_run(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> impl IntoResponse {
    auth.require(Capability::ManageOwnData)?;
    let Path(id) = path?;
    let id = parse_id(&id, "run")?;

    let deleted = state
        .store
        .delete_run(&id, &auth.identity.id)
        .api_err("Failed to delete run")?;

    if !deleted {
        return Err(ApiError::not_found("Run not found"));
    }

    tracing::info!(run_id = %id, user_id = %auth.identity.id, "Run deleted");
    Ok(StatusCode::NO_CONTENT)
}
