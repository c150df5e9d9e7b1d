mod current;
mod github;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

/// Routes under `/auth`. Login and callback are public; they establish the
/// session the rest of the API requires.
pub fn session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/github", get(github::login))
        .route("/github/callback", get(github::callback))
        .route("/logout", post(current::logout))
        .route("/me", get(current::me))
        .route("/refresh", post(current::refresh))
}
