//! # Snapshots
//!
//! Decodes ClusterDeployment objects and core/v1 Events into the typed shapes
//! the classifier and scope filter work on. Nothing downstream of this module
//! touches raw resource payloads.

use super::{ClusterMetadata, ConditionSummary, ObjectRef, ServiceStatus};
use crate::crd::{ClusterDeployment, Condition};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use serde::Serialize;

/// Template name prefixes that identify the infrastructure provider
const KNOWN_PROVIDERS: &[&str] = &[
    "aws", "azure", "vsphere", "openstack", "gcp", "docker", "adopted", "remote",
];

/// Typed view of one ClusterDeployment at a point in time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeploymentSnapshot {
    pub metadata: ClusterMetadata,
    /// Phase string written by the owning controller, if any
    pub status_phase: Option<String>,
    /// At most one entry per condition type
    pub conditions: Vec<ConditionSummary>,
    pub services: Vec<ServiceStatus>,
}

impl DeploymentSnapshot {
    pub fn from_resource(resource: &ClusterDeployment) -> Self {
        let status = resource.status.as_ref();
        Self {
            metadata: cluster_metadata(resource),
            status_phase: status.and_then(|s| s.phase.clone()),
            conditions: status
                .map(|s| summarize_conditions(&s.conditions))
                .unwrap_or_default(),
            services: status
                .map(|s| {
                    s.services
                        .iter()
                        .map(|svc| ServiceStatus {
                            name: svc.name.clone(),
                            namespace: svc.namespace.clone().unwrap_or_default(),
                            template: svc.template.clone().unwrap_or_default(),
                            state: svc.state.clone().unwrap_or_default(),
                            r#type: svc.r#type.clone().unwrap_or_default(),
                            version: svc.version.clone().unwrap_or_default(),
                            conditions: summarize_conditions(&svc.conditions),
                            last_transition_time: svc.last_state_transition_time.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn condition(&self, condition_type: &str) -> Option<&ConditionSummary> {
        self.conditions
            .iter()
            .find(|c| c.r#type == condition_type)
    }
}

/// Collapse raw conditions so that the last entry for each type wins
pub fn summarize_conditions(conditions: &[Condition]) -> Vec<ConditionSummary> {
    let mut summaries: Vec<ConditionSummary> = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let summary = ConditionSummary {
            r#type: condition.r#type.clone(),
            status: condition.status.clone(),
            reason: condition.reason.clone().unwrap_or_default(),
            message: condition.message.clone().unwrap_or_default(),
        };
        match summaries.iter_mut().find(|s| s.r#type == summary.r#type) {
            Some(existing) => *existing = summary,
            None => summaries.push(summary),
        }
    }
    summaries
}

fn cluster_metadata(resource: &ClusterDeployment) -> ClusterMetadata {
    let template = resource.spec.template.clone();
    let config = resource.spec.config.as_ref();
    let region = config
        .and_then(|c| c.get("region").or_else(|| c.get("location")))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    ClusterMetadata {
        name: resource.metadata.name.clone().unwrap_or_default(),
        namespace: resource.metadata.namespace.clone().unwrap_or_default(),
        provider: provider_from_template(&template),
        template,
        credential: resource.spec.credential.clone(),
        region,
        created_at: resource
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(parse_k8s_time),
    }
}

/// Infer the infrastructure provider from a template name such as
/// `aws-standalone-cp-1-0-0`
pub fn provider_from_template(template: &str) -> Option<String> {
    let prefix = template.split('-').next()?.to_ascii_lowercase();
    KNOWN_PROVIDERS
        .contains(&prefix.as_str())
        .then_some(prefix)
}

/// Convert any Kubernetes timestamp wrapper into a chrono timestamp
///
/// Goes through the wrapper's RFC3339 serialization so it does not depend on
/// which datetime crate backs the generated API types.
pub fn parse_k8s_time<T: Serialize>(time: &T) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Typed view of one namespace event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedEvent {
    pub involved: ObjectRef,
    pub reason: String,
    pub message: String,
    /// "Normal" or "Warning"
    pub event_type: String,
    pub event_time: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub first_seen: Option<DateTime<Utc>>,
}

impl ObservedEvent {
    pub fn from_kube(event: &Event) -> Self {
        let involved = &event.involved_object;
        Self {
            involved: ObjectRef {
                kind: involved.kind.clone().unwrap_or_default(),
                name: involved.name.clone().unwrap_or_default(),
                namespace: involved
                    .namespace
                    .clone()
                    .or_else(|| event.metadata.namespace.clone()),
            },
            reason: event.reason.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
            event_type: event.type_.clone().unwrap_or_else(|| "Normal".to_string()),
            event_time: event.event_time.as_ref().and_then(parse_k8s_time),
            last_seen: event.last_timestamp.as_ref().and_then(parse_k8s_time),
            first_seen: event.first_timestamp.as_ref().and_then(parse_k8s_time),
        }
    }

    /// Event-time, then last-seen, then first-seen
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.event_time.or(self.last_seen).or(self.first_seen)
    }

    pub fn is_warning(&self) -> bool {
        self.event_type.eq_ignore_ascii_case("warning")
    }
}
