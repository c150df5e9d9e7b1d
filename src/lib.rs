//! # EcoCI
//!
//! Carbon-accounting API for CI pipelines: GitHub sign-in, ingestion of
//! per-run energy and emission measurements, and per-repository statistics.
//! Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! ecoci = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ecoci::config::ServerConfig;
//! use ecoci::server::{AppState, create_router};
//! use ecoci::store::{SqliteStore, Store};
//!
//! let config = ServerConfig { /* secrets, GitHub app credentials */ ..Default::default() };
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), config).unwrap());
//! let router = create_router(state);
//! // Serve with axum, using `into_make_service_with_connect_info::<SocketAddr>()`
//! // so the rate limiter can see client addresses.
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `ecoci` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod server;
pub mod store;
pub mod types;
