//! # Error Policy
//!
//! Classification of Kubernetes watch errors into transient and fatal.
//!
//! The manager keeps a subscription running through transient errors and
//! ends it with a terminal update on fatal ones.

use tracing::{error, warn};

/// What kind of failure a watch error string describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401/403 - RBAC revoked or token expired
    Unauthorized,
    /// 410 - resource version expired, the watcher relists
    Expired,
    /// 429 - API server storage reinitializing or throttling
    Throttled,
    /// 404 - the watched object or API is gone
    NotFound,
    Other,
}

impl WatchErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, WatchErrorKind::Expired | WatchErrorKind::Throttled)
    }

    /// Label for watch error metrics
    pub fn as_str(self) -> &'static str {
        match self {
            WatchErrorKind::Unauthorized => "unauthorized",
            WatchErrorKind::Expired => "expired",
            WatchErrorKind::Throttled => "throttled",
            WatchErrorKind::NotFound => "not_found",
            WatchErrorKind::Other => "other",
        }
    }
}

/// Classify a watch error by the markers the API server puts in its message
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_401 = error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");
    let is_not_found = error_string.contains("ObjectNotFound")
        || (error_string.contains("404") && error_string.contains("not found"));

    if is_401 {
        WatchErrorKind::Unauthorized
    } else if is_410 {
        WatchErrorKind::Expired
    } else if is_429 {
        WatchErrorKind::Throttled
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch error with guidance matching its classification
pub fn log_watch_error(stream: &str, namespace: &str, name: &str, error_string: &str) -> WatchErrorKind {
    let kind = classify_watch_error(error_string);
    match kind {
        WatchErrorKind::Unauthorized => {
            error!(
                resource.namespace = namespace,
                resource.name = name,
                stream,
                "Watch authentication failed - RBAC may have been revoked or token expired: {}",
                error_string
            );
            error!("Verify the monitor can still watch: kubectl auth can-i watch clusterdeployments -n {}", namespace);
        }
        WatchErrorKind::Expired => {
            warn!(
                resource.namespace = namespace,
                resource.name = name,
                stream,
                "Watch resource version expired (410), watcher will relist"
            );
        }
        WatchErrorKind::Throttled => {
            warn!(
                resource.namespace = namespace,
                resource.name = name,
                stream,
                "API server throttling watch (429), watcher will back off"
            );
        }
        WatchErrorKind::NotFound => {
            warn!(
                resource.namespace = namespace,
                resource.name = name,
                stream,
                "Watched object or API not found: {}",
                error_string
            );
        }
        WatchErrorKind::Other => {
            error!(
                resource.namespace = namespace,
                resource.name = name,
                stream,
                "Watch stream error: {}",
                error_string
            );
        }
    }
    kind
}
