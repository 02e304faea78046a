//! Status server handlers and their shared state.

pub mod health;

pub use health::{health_handler, liveness_handler, metrics_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use super::ShutdownController;
use crate::engine::SyncEngine;

/// State carried through axum extractors. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub shutdown: Arc<ShutdownController>,
    /// Renders `GET /metrics`; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
}
