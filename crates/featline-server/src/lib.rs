//! featline server library
//!
//! Exposes the HTTP layer for the `featline` binary and for integration
//! tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use featline_server::{config, router, state::AppState};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = config::load("featline.yaml")?;
//! let state = AppState::from_config(&config, CancellationToken::new()).await?;
//! let app = router(state, config.server.max_body_bytes);
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use state::AppState;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Builds the router with all routes and middleware
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/v1/info", get(api::info))
        .route("/v1/features/online", post(api::get_online_features))
        .route("/metrics", get(api::metrics))
        // route_layer: runs after routing so the matched path is known
        .route_layer(middleware::from_fn(metrics::track_http))
        .with_state(state)
        // Applied in reverse order (bottom to top)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
