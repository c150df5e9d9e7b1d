use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use crate::auth::RequireAuth;
use crate::auth::helpers::{SESSION_COOKIE, build_cookie, clear_cookie};
use crate::server::AppState;
use crate::server::dto::{MessageResponse, SessionResponse};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};

pub async fn logout(auth: RequireAuth, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cookie = clear_cookie(SESSION_COOKIE, &state.config.cookie)
        .api_err("Failed to build session cookie")?;

    tracing::info!(user_id = %auth.identity.id, "User logged out");

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cookie);
    Ok::<_, ApiError>((
        headers,
        Json(MessageResponse::new("Successfully logged out")),
    ))
}

pub async fn me(auth: RequireAuth) -> impl IntoResponse {
    Json(ApiResponse::success(auth.identity))
}

/// Re-issues the session cookie. Only a currently valid token can be refreshed.
pub async fn refresh(auth: RequireAuth, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let token = state
        .tokens
        .refresh(&auth.token)
        .api_err("Failed to refresh session token")?;

    let lifetime = state.tokens.lifetime_secs();
    let cookie = build_cookie(SESSION_COOKIE, &token, lifetime, &state.config.cookie)
        .api_err("Failed to build session cookie")?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cookie);
    Ok::<_, ApiError>((
        headers,
        Json(ApiResponse::success(SessionResponse {
            user: auth.identity,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })),
    ))
}
