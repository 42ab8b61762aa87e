//! API route definitions
//!
//! - /api/v1/status - latest classification snapshot
//! - /api/v1/health - per-loop watchdog health
//! - /api/v1/config - effective configuration

use axum::{routing::get, Router};

use super::handlers::{self, ApiState};

/// Create all v1 routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/health", get(handlers::get_health))
        .route("/config", get(handlers::get_config))
        .with_state(state)
}
