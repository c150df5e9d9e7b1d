mod repos;
mod runs;
mod stats;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Runs
        .route("/runs", post(runs::create_run).get(runs::list_runs))
        .route("/runs/{id}", get(runs::get_run).delete(runs::delete_run))
        // Repositories
        .route("/repos", get(repos::list_repos))
        .route("/repos/{id}", get(repos::get_repo).delete(repos::delete_repo))
        .route("/repos/{id}/runs", get(repos::list_repo_runs))
        // Statistics
        .route("/users/me/stats", get(stats::my_stats))
}
