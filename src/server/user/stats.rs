use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::types::Capability;

/// Emission totals across everything the caller has submitted.
pub async fn my_stats(auth: RequireAuth, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    auth.require(Capability::ReadStatistics)?;

    let stats = state
        .store
        .get_identity_stats(&auth.identity.id)
        .api_err("Failed to compute statistics")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(stats)))
}
