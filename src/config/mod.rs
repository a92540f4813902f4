//! # Configuration
//!
//! Monitor and server settings loaded from environment variables.
//!
//! Every setting has a default in [`crate::constants`]. Unset or unparsable
//! variables fall back to the default.

mod monitor;
mod server;

pub use monitor::MonitorConfig;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (MonitorConfig, ServerConfig) {
    (MonitorConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a comma-separated list; blank entries are dropped
pub(crate) fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| parse_list(&v))
        .unwrap_or_default()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
