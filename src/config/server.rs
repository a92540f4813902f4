//! # Server Configuration
//!
//! HTTP server settings for metrics and health probes.

use super::env_var_or_default;
use crate::constants::DEFAULT_METRICS_PORT;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`; 0 disables the server
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
        }
    }

    pub fn enabled(&self) -> bool {
        self.metrics_port != 0
    }
}
