//! # Monitor Errors
//!
//! Error types returned synchronously by the subscription manager and by the
//! watch collaborators it consumes.

use thiserror::Error;

/// Result type for subscription manager operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors surfaced by `subscribe` and `get_state`
///
/// Failures after a subscription is running are never returned here; they are
/// delivered to the observer as updates instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Target identity could not be parsed or is missing a part
    #[error("invalid subscription target: {0}")]
    InvalidTarget(String),

    /// Timeout parameter is not a positive number of seconds
    #[error("invalid timeout '{0}': expected a positive number of seconds")]
    InvalidTimeout(String),

    /// Namespace is not in the configured allow-list
    #[error("namespace '{namespace}' is not authorized")]
    Unauthorized { namespace: String },

    /// No progress sink is bound to the manager
    #[error("subscription manager is not bound to a progress sink")]
    NotBound,

    /// Target resource does not exist
    #[error("ClusterDeployment {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    /// Per-caller or global subscription quota exhausted
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Fetching the resource or opening a watch failed
    #[error("watch setup failed: {0}")]
    Watch(#[from] WatchError),
}

impl MonitorError {
    /// Short label used for rejection metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorError::InvalidTarget(_) => "invalid_target",
            MonitorError::InvalidTimeout(_) => "invalid_timeout",
            MonitorError::Unauthorized { .. } => "unauthorized",
            MonitorError::NotBound => "not_bound",
            MonitorError::NotFound { .. } => "not_found",
            MonitorError::Capacity(CapacityError::CallerLimit { .. }) => "caller_limit",
            MonitorError::Capacity(CapacityError::GlobalLimit { .. }) => "global_limit",
            MonitorError::Watch(_) => "watch_setup",
        }
    }
}

/// Subscription quota exhaustion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("caller '{caller}' already holds the maximum of {limit} subscriptions")]
    CallerLimit { caller: String, limit: usize },

    #[error("process-wide subscription limit of {limit} reached")]
    GlobalLimit { limit: usize },
}

/// Errors from the resource and event collaborators
#[derive(Debug, Clone, Error)]
pub enum WatchError {
    /// The API server rejected or failed the request
    #[error("api error: {0}")]
    Api(String),

    /// A watch stream reported an error
    #[error("watch stream error: {0}")]
    Stream(String),

    /// A payload could not be decoded into the typed model
    #[error("decode error: {0}")]
    Decode(String),
}

impl WatchError {
    /// Whether the resource watch can keep running after this error
    pub fn is_transient(&self) -> bool {
        match self {
            WatchError::Api(message) | WatchError::Stream(message) => {
                crate::runtime::error_policy::classify_watch_error(message).is_transient()
            }
            WatchError::Decode(_) => true,
        }
    }
}
