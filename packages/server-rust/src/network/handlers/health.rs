//! Health, liveness, readiness and metrics endpoints.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Lifecycle state plus the report of the last completed cycle.
///
/// Always 200; a failing table shows up in `last_cycle`, not in the status
/// code, so the endpoint stays usable for dashboards during outages.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let last_cycle = state
        .engine
        .last_report()
        .and_then(|report| serde_json::to_value(&*report).ok());

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "cycle_running": state.engine.is_running(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "last_cycle": last_cycle,
    }))
}

/// Liveness probe: the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 while the worker is scheduling cycles, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
