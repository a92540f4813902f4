//! # ClusterDeployment Status
//!
//! Status types carrying conditions and per-service deployment state.

use serde::{Deserialize, Serialize};

/// Observed state of a ClusterDeployment
#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentStatus {
    /// Coarse phase reported by the owning controller, when it sets one
    /// Values seen in practice: Provisioning, Ready, Failed, Deleting
    #[serde(default)]
    pub phase: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Add-on services deployed onto the cluster
    #[serde(default)]
    pub services: Vec<ServiceStatusEntry>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

/// Deployment state of one add-on service
#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusEntry {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    /// Lifecycle state string (Provisioning, Deployed, Failed, ...)
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub last_state_transition_time: Option<String>,
}
