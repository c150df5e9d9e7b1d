use std::sync::Arc;

use axum::middleware;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use chrono::Utc;
use tower::ServiceBuilder;

use super::admin::admin_router;
use super::dto::HealthResponse;
use super::gateway::{cors_layer, log_request, security_headers};
use super::ratelimit::{RateLimiter, rate_limit};
use super::response::ApiError;
use super::session::session_router;
use super::user::user_router;
use crate::auth::{GitHubOAuth, TokenManager};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenManager,
    pub oauth: GitHubOAuth,
    pub rate_limiter: RateLimiter,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let lifetime = i64::try_from(config.token_lifetime.as_secs())
            .map_err(|_| Error::Config("token lifetime is too large".to_string()))?;

        Ok(Self {
            store,
            tokens: TokenManager::new(config.jwt_secret.as_bytes(), lifetime),
            oauth: GitHubOAuth::new(config.oauth.clone())?,
            rate_limiter: RateLimiter::new(&config.rate_limit),
            config,
        })
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn fallback() -> ApiError {
    ApiError::not_found("Route not found")
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", session_router())
        .nest("/admin", admin_router())
        .merge(user_router())
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_request))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    security_headers,
                ))
                .layer(cors_layer(&state.config.allowed_origins))
                .layer(middleware::from_fn_with_state(state.clone(), rate_limit)),
        )
        .with_state(state)
}
