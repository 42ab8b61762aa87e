//! Read-only status endpoints
//!
//! Bodies are plain JSON. Errors are `{ "error": "..." }` with a matching
//! status code.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::background::HealthStatus;
use crate::config::PondConfig;
use crate::types::{LoopName, SharedState, StateSnapshot, Tier};

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub state: SharedState,
    pub config: Arc<PondConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No such endpoint: {0}")]
    UnknownPath(String),
    #[error("Failed to serialize config: {0}")]
    Config(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownPath(_) => StatusCode::NOT_FOUND,
            ApiError::Config(e) => {
                tracing::error!(error = %e, "[HttpServer] Config serialization failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body of GET /status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub site: String,
    /// Classification sequence number; unchanged between polls means no new reading
    pub seq: u64,
    /// One-line summary for dashboards, e.g. `CRITICAL (score 90), pump SHORT running`
    pub summary: String,
    #[serde(flatten)]
    pub snapshot: StateSnapshot,
}

fn summarize(snapshot: &StateSnapshot) -> String {
    let quality = match &snapshot.status {
        Some(status) => format!("{} (score {})", status.tier, status.score),
        None => "awaiting first reading".to_string(),
    };
    let pump = if snapshot.pump.running {
        format!("pump {} running", snapshot.pump.mode)
    } else {
        "pump idle".to_string()
    };
    format!("{quality}, {pump}")
}

/// GET /api/v1/status - Latest classification, pump and telemetry counters
pub async fn get_status(State(api): State<ApiState>) -> Json<StatusResponse> {
    let (seq, snapshot) = {
        let state = api.state.lock().await;
        (state.status_seq, state.snapshot())
    };
    Json(StatusResponse {
        site: api.config.site.name.clone(),
        seq,
        summary: summarize(&snapshot),
        snapshot,
    })
}

/// Per-loop watchdog health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// True when every loop reports HEALTHY
    pub healthy: bool,
    pub uptime_secs: u64,
    pub tier: Option<Tier>,
    pub sensor_failures: u32,
    pub telemetry_backlog: usize,
    pub loops: BTreeMap<LoopName, String>,
}

/// GET /api/v1/health
///
/// 503 once any loop has stopped reporting; a degraded loop is still 200.
pub async fn get_health(State(api): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let state = api.state.lock().await;
    let stalled = state
        .health
        .values()
        .any(|s| matches!(s, HealthStatus::Unhealthy { .. }));
    let snapshot = state.snapshot();
    drop(state);

    let code = if stalled {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthResponse {
        healthy: snapshot.health.values().all(|s| s == "HEALTHY"),
        uptime_secs: snapshot.uptime_secs,
        tier: snapshot.status.as_ref().map(|s| s.tier),
        sensor_failures: snapshot.consecutive_sensor_failures,
        telemetry_backlog: snapshot.telemetry.backlog,
        loops: snapshot.health,
    };
    (code, Json(body))
}

/// GET /api/v1/config - Effective configuration, with the API key redacted
pub async fn get_config(State(api): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    let mut config = (*api.config).clone();
    if !config.telemetry.api_key.is_empty() {
        config.telemetry.api_key = "***".to_string();
    }
    Ok(Json(serde_json::to_value(&config)?))
}

/// Fallback for unknown paths
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::UnknownPath(uri.path().to_string())
}
