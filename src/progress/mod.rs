//! # Provisioning Progress
//!
//! Types describing the provisioning progress of a ClusterDeployment and the
//! pure logic that derives them:
//!
//! - `snapshot` - decoding of raw resources and events into typed snapshots
//! - `phase` - phase classification and completion estimates
//! - `events` - event scope filtering and the retained event window
//! - `clock` - injectable time source

pub mod clock;
pub mod events;
pub mod phase;
pub mod snapshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventEvaluation, EventRule, EventScopeFilter, RetainedEvents};
pub use phase::{detect_phase, estimate_progress, summarize_phase, PhaseSummary};
pub use snapshot::{DeploymentSnapshot, ObservedEvent};

/// Coarse lifecycle phase of a cluster deployment
///
/// `Ready` and `Failed` are the only terminal phases. The type carries no
/// ordering; priority between phases only exists inside [`detect_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProvisioningPhase {
    #[default]
    Unknown,
    Initializing,
    Provisioning,
    Bootstrapping,
    Scaling,
    Installing,
    Ready,
    Failed,
}

impl ProvisioningPhase {
    /// Whether no further progress can follow this phase
    pub fn is_terminal(self) -> bool {
        matches!(self, ProvisioningPhase::Ready | ProvisioningPhase::Failed)
    }

    /// Stable string form, also used as a metric label
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningPhase::Unknown => "Unknown",
            ProvisioningPhase::Initializing => "Initializing",
            ProvisioningPhase::Provisioning => "Provisioning",
            ProvisioningPhase::Bootstrapping => "Bootstrapping",
            ProvisioningPhase::Scaling => "Scaling",
            ProvisioningPhase::Installing => "Installing",
            ProvisioningPhase::Ready => "Ready",
            ProvisioningPhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProvisioningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgent an update is for the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Where the information in an update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Condition,
    Event,
    Log,
    System,
}

/// Reference to the object an event was reported against
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One status condition as read from the resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    #[serde(rename = "type")]
    pub r#type: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl ConditionSummary {
    pub fn is_true(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }

    pub fn is_false(&self) -> bool {
        self.status.eq_ignore_ascii_case("false")
    }
}

/// Identity and context of the cluster, captured once per update
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub name: String,
    pub namespace: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Deployment state of one add-on service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub namespace: String,
    pub template: String,
    pub state: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub version: String,
    pub conditions: Vec<ConditionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// The externally observable unit of progress
///
/// Updates are handed to the sink by value, so a queued update never aliases
/// state a subscription worker is still editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub timestamp: DateTime<Utc>,
    pub phase: ProvisioningPhase,
    /// Rough completion estimate, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub message: String,
    pub reason: String,
    pub source: UpdateSource,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_object: Option<ObjectRef>,
    #[serde(default)]
    pub conditions: Vec<ConditionSummary>,
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterMetadata>,
    #[serde(default)]
    pub services: Vec<ServiceStatus>,
}

impl ProgressUpdate {
    /// Create an update whose terminal flag follows the phase
    pub fn new(
        timestamp: DateTime<Utc>,
        phase: ProvisioningPhase,
        message: impl Into<String>,
        reason: impl Into<String>,
        source: UpdateSource,
    ) -> Self {
        Self {
            timestamp,
            phase,
            progress: None,
            message: message.into(),
            reason: reason.into(),
            source,
            severity: if phase == ProvisioningPhase::Failed {
                Severity::Error
            } else {
                Severity::Info
            },
            related_object: None,
            conditions: Vec::new(),
            terminal: phase.is_terminal(),
            cluster: None,
            services: Vec::new(),
        }
    }

    /// Attach the condition, metadata and service context of a snapshot
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: &DeploymentSnapshot) -> Self {
        self.conditions.clone_from(&snapshot.conditions);
        self.cluster = Some(snapshot.metadata.clone());
        self.services.clone_from(&snapshot.services);
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Option<u8>) -> Self {
        self.progress = progress;
        self
    }

    /// Mark the update as ending the stream regardless of its phase
    ///
    /// Used for deletion, timeout and fatal watch errors.
    #[must_use]
    pub fn ending_stream(mut self) -> Self {
        self.terminal = true;
        self
    }
}
