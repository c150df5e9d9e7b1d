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

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{PaginationParams, UpdateRoleRequest};
use crate::server::response::{
    ApiError, ApiResponse, PaginatedResponse, StoreOptionExt, StoreResultExt,
};
use crate::server::validation::{page_request, parse_id};

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    params: Result<Query<PaginationParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    let page = page_request(&params, state.config.max_page_size);

    let users = state
        .store
        .list_identities(page)
        .api_err("Failed to list users")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, page)))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> impl IntoResponse {
    let Path(id) = path?;
    let id = parse_id(&id, "user")?;

    let user = state
        .store
        .get_identity(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn update_role(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Path(id) = path?;
    let id = parse_id(&id, "user")?;
    let Json(req) = body?;

    let user = state
        .store
        .set_identity_role(&id, req.role)
        .api_err("Failed to update role")?
        .or_not_found("User not found")?;

    tracing::info!(
        admin = %admin.identity.handle,
        user = %user.handle,
        role = %user.role,
        "Role updated"
    );
    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// Removes the user with all their repositories and runs. Admins cannot
/// delete themselves.
pub async fn delete_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> impl IntoResponse {
    let Path(id) = path?;
    let id = parse_id(&id, "user")?;

    if id == admin.identity.id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }

    let deleted = state
        .store
        .delete_identity(&id)
        .api_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(admin = %admin.identity.handle, user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
