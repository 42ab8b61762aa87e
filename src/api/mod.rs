//! Read-only JSON status API using Axum

pub mod handlers;
mod routes;

pub use handlers::{ApiError, ApiState};

use crate::types::LoopName;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// CORS layer, same-origin by default.
///
/// Set `POND_CORS_ORIGINS` to a comma-separated list of allowed origins for a
/// dashboard served from elsewhere.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);
    match std::env::var("POND_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

/// Serve `app` until the token is cancelled.
pub async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) -> LoopName {
    info!("[HttpServer] Task starting");
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    match result {
        Ok(()) => info!("[HttpServer] Graceful shutdown complete"),
        Err(e) => error!("[HttpServer] Server error: {}", e),
    }
    LoopName::HttpServer
}
