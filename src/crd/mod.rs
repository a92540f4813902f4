//! # Custom Resource Definitions
//!
//! CRD types for the ClusterDeployment resources whose provisioning progress
//! is streamed by the monitor.
//!
//! Only the fields the monitor reads are modelled. Unknown fields are ignored
//! on deserialization so newer API revisions keep decoding.

mod status;

use serde::{Deserialize, Serialize};

pub use status::{ClusterDeploymentStatus, Condition, ServiceStatusEntry};

/// ClusterDeployment Custom Resource Definition
///
/// Represents a managed cluster's desired and observed state.
///
/// # Example
///
/// ```yaml
/// apiVersion: k0rdent.mirantis.com/v1beta1
/// kind: ClusterDeployment
/// metadata:
///   name: prod-eu-1
///   namespace: kcm-system
/// spec:
///   template: aws-standalone-cp-1-0-0
///   credential: aws-cluster-identity-cred
///   config:
///     region: eu-central-1
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ClusterDeployment",
    group = "k0rdent.mirantis.com",
    version = "v1beta1",
    namespaced,
    status = "ClusterDeploymentStatus",
    shortname = "cld",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Template", "type":"string", "jsonPath":".spec.template"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentSpec {
    /// Name of the ClusterTemplate used to render the cluster
    #[serde(default)]
    pub template: String,
    /// Name of the Credential used to reach the infrastructure provider
    #[serde(default)]
    pub credential: Option<String>,
    /// Free-form template values (region, machine sizes, ...)
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    /// Render templates without creating infrastructure
    #[serde(default)]
    pub dry_run: bool,
}
