//! # Constants
//!
//! Default values shared by configuration, the subscription manager and the
//! event scope filter. Every value here can be overridden through
//! [`crate::config`].

/// Default monitoring window for a subscription (1 hour)
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// How long before the deadline the one-shot timeout warning is emitted (5 minutes)
pub const DEFAULT_TIMEOUT_WARNING_SECS: u64 = 300;

/// Interval of the bookkeeping timer inside each subscription worker
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;

/// Conditions unchanged for this long are reported as stalled (log only)
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = 600;

/// Maximum concurrent subscriptions held by a single caller
pub const DEFAULT_PER_CALLER_SUBSCRIPTION_LIMIT: usize = 10;

/// Maximum concurrent subscriptions across the process
pub const DEFAULT_GLOBAL_SUBSCRIPTION_LIMIT: usize = 100;

/// Maximum number of events retained per subscription
pub const DEFAULT_EVENT_RETENTION_COUNT: usize = 50;

/// Maximum age of retained events (2 minutes)
pub const DEFAULT_EVENT_RETENTION_SECS: u64 = 120;

/// Number of most recent namespace events seeded into a new subscription
pub const DEFAULT_EVENT_SNAPSHOT_LIMIT: usize = 20;

/// Default port for the metrics and probe server
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Caller identity used when the transport does not supply one
pub const DEFAULT_CALLER: &str = "anonymous";

/// Component name reported in logs
pub const COMPONENT_NAME: &str = "cluster-progress-monitor";

/// How long startup waits for the probe server to bind
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the probe server to bind
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Capacity of the channel between subscription workers and the output writer
pub const DEFAULT_SINK_CAPACITY: usize = 256;
