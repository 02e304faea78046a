//! Status server with deferred startup.
//!
//! `new()` assembles state, `start()` binds the listener, and `serve()`
//! accepts requests until shutdown. Binding early lets the binary fail fast
//! on a taken port before the first sync cycle runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, metrics_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::engine::SyncEngine;

pub struct StatusServer {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl StatusServer {
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        engine: Arc<SyncEngine>,
        shutdown: Arc<ShutdownController>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            listener: None,
            state: AppState {
                engine,
                shutdown,
                metrics,
                start_time: Instant::now(),
            },
        }
    }

    /// Routes:
    /// - `GET /health`: lifecycle state and last cycle report
    /// - `GET /health/live`: liveness probe
    /// - `GET /health/ready`: readiness probe
    /// - `GET /metrics`: Prometheus exposition
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "status server bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("status server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use indexsync_core::TableSyncSpec;

    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::index::MemoryIndex;
    use crate::service::SyncConfig;
    use crate::source::MemorySource;

    fn server(port: u16) -> StatusServer {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let engine = SyncEngine::new(
            vec![TableSyncSpec::new("club")],
            Arc::new(MemorySource::new(now)),
            Arc::new(MemoryIndex::new()),
            Arc::new(MemoryCheckpointStore::new()),
            SyncConfig::default(),
        );
        StatusServer::new(
            NetworkConfig {
                host: "127.0.0.1".to_string(),
                port,
                ..NetworkConfig::default()
            },
            Arc::new(engine),
            Arc::new(ShutdownController::new()),
            None,
        )
    }

    #[test]
    fn build_router_creates_router() {
        let _router = server(0).build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut server = server(0);
        let port = server.start().await.unwrap();
        assert!(port > 0);
        assert!(server.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let result = server(0).serve(std::future::ready(())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serve_returns_when_shutdown_resolves() {
        let mut server = server(0);
        server.start().await.unwrap();
        server.serve(std::future::ready(())).await.unwrap();
    }
}
