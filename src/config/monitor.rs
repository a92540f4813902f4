//! # Monitor Configuration
//!
//! Subscription windows, timers, quotas and event retention.

use super::{env_list, env_var_or_default};
use crate::constants::{
    DEFAULT_EVENT_RETENTION_COUNT, DEFAULT_EVENT_RETENTION_SECS, DEFAULT_EVENT_SNAPSHOT_LIMIT,
    DEFAULT_GLOBAL_SUBSCRIPTION_LIMIT, DEFAULT_PER_CALLER_SUBSCRIPTION_LIMIT,
    DEFAULT_STALL_THRESHOLD_SECS, DEFAULT_TICK_INTERVAL_SECS, DEFAULT_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_WARNING_SECS,
};
use std::time::Duration;

/// Subscription manager configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Monitoring window used when a subscriber does not ask for one
    pub default_timeout: Duration,
    /// How long before the deadline the one-shot warning goes out
    pub timeout_warning: Duration,
    /// Bookkeeping timer period (timeouts, stalls, event pruning)
    pub tick_interval: Duration,
    /// Condition silence after which a stall is logged
    pub stall_threshold: Duration,
    pub per_caller_limit: usize,
    pub global_limit: usize,
    /// Retained event window, count cap
    pub event_retention_count: usize,
    /// Retained event window, age cap
    pub event_retention: Duration,
    /// Newest events seeded from the initial listing
    pub event_snapshot_limit: usize,
    /// Namespace allow-list as regular expressions; empty admits all
    pub allowed_namespaces: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            timeout_warning: Duration::from_secs(DEFAULT_TIMEOUT_WARNING_SECS),
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            stall_threshold: Duration::from_secs(DEFAULT_STALL_THRESHOLD_SECS),
            per_caller_limit: DEFAULT_PER_CALLER_SUBSCRIPTION_LIMIT,
            global_limit: DEFAULT_GLOBAL_SUBSCRIPTION_LIMIT,
            event_retention_count: DEFAULT_EVENT_RETENTION_COUNT,
            event_retention: Duration::from_secs(DEFAULT_EVENT_RETENTION_SECS),
            event_snapshot_limit: DEFAULT_EVENT_SNAPSHOT_LIMIT,
            allowed_namespaces: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            default_timeout: Duration::from_secs(env_var_or_default(
                "DEFAULT_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            timeout_warning: Duration::from_secs(env_var_or_default(
                "TIMEOUT_WARNING_SECS",
                DEFAULT_TIMEOUT_WARNING_SECS,
            )),
            tick_interval: Duration::from_secs(
                env_var_or_default("TICK_INTERVAL_SECS", DEFAULT_TICK_INTERVAL_SECS).max(1),
            ),
            stall_threshold: Duration::from_secs(env_var_or_default(
                "STALL_THRESHOLD_SECS",
                DEFAULT_STALL_THRESHOLD_SECS,
            )),
            per_caller_limit: env_var_or_default(
                "PER_CALLER_SUBSCRIPTION_LIMIT",
                DEFAULT_PER_CALLER_SUBSCRIPTION_LIMIT,
            ),
            global_limit: env_var_or_default(
                "GLOBAL_SUBSCRIPTION_LIMIT",
                DEFAULT_GLOBAL_SUBSCRIPTION_LIMIT,
            ),
            event_retention_count: env_var_or_default(
                "EVENT_RETENTION_COUNT",
                DEFAULT_EVENT_RETENTION_COUNT,
            ),
            event_retention: Duration::from_secs(env_var_or_default(
                "EVENT_RETENTION_SECS",
                DEFAULT_EVENT_RETENTION_SECS,
            )),
            event_snapshot_limit: env_var_or_default(
                "EVENT_SNAPSHOT_LIMIT",
                DEFAULT_EVENT_SNAPSHOT_LIMIT,
            ),
            allowed_namespaces: env_list("ALLOWED_NAMESPACES"),
        }
    }
}
