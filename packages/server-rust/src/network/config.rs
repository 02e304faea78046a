//! Status server configuration.

use std::time::Duration;

/// Bind address and limits for the status server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time a status request may take.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9464,
            request_timeout: Duration::from_secs(10),
        }
    }
}
