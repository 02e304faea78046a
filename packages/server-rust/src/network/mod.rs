//! Status surface: health probes, last cycle report, and Prometheus metrics.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use module::StatusServer;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
