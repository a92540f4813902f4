//! # Subscription Targets
//!
//! Identity of a streamed resource: `{namespace}/{name}`, optionally followed
//! by `?timeout=<seconds>`.

use super::errors::MonitorError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Namespace and name of a ClusterDeployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionTarget {
    pub namespace: String,
    pub name: String,
}

impl SubscriptionTarget {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reject identities with an empty namespace or name
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.namespace.trim().is_empty() {
            return Err(MonitorError::InvalidTarget("namespace is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(MonitorError::InvalidTarget("name is required".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A target plus the optional monitoring window requested with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub target: SubscriptionTarget,
    pub timeout: Option<Duration>,
}

impl FromStr for SubscriptionRequest {
    type Err = MonitorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw, None),
        };

        let mut parts = path.trim().trim_matches('/').split('/');
        let (Some(namespace), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MonitorError::InvalidTarget(format!(
                "'{raw}' must have the form <namespace>/<name>"
            )));
        };
        let target = SubscriptionTarget::new(namespace, name);
        target.validate()?;

        let mut timeout = None;
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("timeout", value)) => timeout = Some(parse_timeout_secs(value)?),
                _ => {
                    return Err(MonitorError::InvalidTarget(format!(
                        "unsupported parameter '{pair}'"
                    )))
                }
            }
        }

        Ok(Self { target, timeout })
    }
}

/// Parse a timeout given in whole seconds; zero, negative and non-numeric
/// values are rejected
pub fn parse_timeout_secs(value: &str) -> Result<Duration, MonitorError> {
    match value.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs.unsigned_abs())),
        _ => Err(MonitorError::InvalidTimeout(value.to_string())),
    }
}
