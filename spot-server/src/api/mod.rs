//! API routes
//!
//! - [`health`] - liveness probe
//! - [`issues`] - issue reporting, tracking and resolution

pub mod health;
pub mod issues;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::ServerState;

/// Every route, no middleware or state
pub fn build_router(state: &ServerState) -> Router<ServerState> {
    Router::new()
        // Issue API - per-route auth and rate limits
        .merge(issues::router(state))
        // Health API - public route
        .merge(health::router())
}

/// Fully configured application, used by the server and by tests
pub fn build_app(state: &ServerState) -> Router {
    build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
}
