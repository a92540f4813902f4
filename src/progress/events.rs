//! # Event Scope Filter
//!
//! Decides which namespace events belong to a ClusterDeployment's
//! provisioning story and which of them should produce a progress update.
//!
//! Every observed event is kept in a bounded [`RetainedEvents`] window, in
//! scope or not. Only in-scope events are handed to the classifier or
//! evaluated against the [`EventRule`] table.

use super::{Clock, ObjectRef, ObservedEvent, ProvisioningPhase, Severity};
use crate::constants::{DEFAULT_EVENT_RETENTION_COUNT, DEFAULT_EVENT_RETENTION_SECS};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

/// Kind of the target resource itself
pub const CLUSTER_DEPLOYMENT_KIND: &str = "ClusterDeployment";

/// Kinds created on behalf of a ClusterDeployment and named after it
const SUBSIDIARY_KINDS: &[&str] = &["ServiceSet", "Cluster", "MachineDeployment", "Machine"];

/// Maps an event reason to the phase it implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRule {
    pub reason: String,
    pub phase: ProvisioningPhase,
}

impl EventRule {
    pub fn new(reason: impl Into<String>, phase: ProvisioningPhase) -> Self {
        Self {
            reason: reason.into(),
            phase,
        }
    }

    /// Built-in rule table; extend through [`EventScopeFilter::with_rules`]
    pub fn defaults() -> Vec<EventRule> {
        vec![
            EventRule::new("ServiceInstalling", ProvisioningPhase::Installing),
            EventRule::new("ServiceSetInstalling", ProvisioningPhase::Installing),
            EventRule::new("InfrastructureProvisioning", ProvisioningPhase::Provisioning),
            EventRule::new("ControlPlaneInitializing", ProvisioningPhase::Bootstrapping),
        ]
    }
}

/// Result of evaluating an in-scope event against the rule table
#[derive(Debug, Clone, PartialEq)]
pub struct EventEvaluation {
    pub timestamp: DateTime<Utc>,
    pub phase: ProvisioningPhase,
    pub message: String,
    pub reason: String,
    pub severity: Severity,
    pub related_object: ObjectRef,
}

/// Bounded window of recently observed events
///
/// Bounded by count and by age. Events without any timestamp are never aged
/// out but still count against the cap. Overflow always drops the oldest
/// arrivals.
#[derive(Debug, Clone)]
pub struct RetainedEvents {
    entries: VecDeque<ObservedEvent>,
    max_count: usize,
    max_age: chrono::Duration,
}

impl Default for RetainedEvents {
    fn default() -> Self {
        Self::new(
            DEFAULT_EVENT_RETENTION_COUNT,
            chrono::Duration::seconds(
                i64::try_from(DEFAULT_EVENT_RETENTION_SECS).unwrap_or(i64::MAX),
            ),
        )
    }
}

impl RetainedEvents {
    pub fn new(max_count: usize, max_age: chrono::Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_count),
            max_count,
            max_age,
        }
    }

    pub fn push(&mut self, event: ObservedEvent, now: DateTime<Utc>) {
        self.entries.push_back(event);
        self.prune(now);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.max_age;
        self.entries
            .retain(|e| e.timestamp().is_none_or(|ts| ts >= cutoff));
        while self.entries.len() > self.max_count {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained events, newest first
    pub fn newest_first(&self) -> impl Iterator<Item = &ObservedEvent> {
        self.entries.iter().rev()
    }
}

/// Per-subscription scope filter for one target resource
#[derive(Debug)]
pub struct EventScopeFilter {
    name: String,
    namespace: String,
    clock: Arc<dyn Clock>,
    rules: Vec<EventRule>,
    window: RetainedEvents,
}

impl EventScopeFilter {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            clock,
            rules: EventRule::defaults(),
            window: RetainedEvents::default(),
        }
    }

    #[must_use]
    pub fn with_rules(mut self, rules: Vec<EventRule>) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, max_count: usize, max_age: chrono::Duration) -> Self {
        self.window = RetainedEvents::new(max_count, max_age);
        self
    }

    /// Whether the event describes the target or one of its subsidiaries
    ///
    /// Subsidiaries are matched by name only (`{target}` or `{target}-*`):
    /// an event's involved object carries no owner references. A sibling
    /// deployment whose name extends the target's with a dash, such as
    /// `prod-eu-1-b` next to `prod-eu-1`, therefore has its subsidiaries
    /// counted as in scope for both.
    pub fn in_scope(&self, event: &ObservedEvent) -> bool {
        let involved = &event.involved;
        if involved
            .namespace
            .as_deref()
            .is_some_and(|ns| !ns.is_empty() && ns != self.namespace)
        {
            return false;
        }
        if involved.name == self.name {
            return involved.kind.is_empty()
                || involved.kind == CLUSTER_DEPLOYMENT_KIND
                || SUBSIDIARY_KINDS.contains(&involved.kind.as_str());
        }
        SUBSIDIARY_KINDS.contains(&involved.kind.as_str())
            && involved
                .name
                .strip_prefix(self.name.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Map an in-scope event with a known reason to a phase override
    pub fn evaluate(&self, event: &ObservedEvent) -> Option<EventEvaluation> {
        if !self.in_scope(event) {
            return None;
        }
        let rule = self.rules.iter().find(|r| r.reason == event.reason)?;
        let message = if event.message.is_empty() {
            format!("{} reported {}", event.involved.kind, event.reason)
        } else {
            event.message.clone()
        };
        Some(EventEvaluation {
            timestamp: self.clock.now(),
            phase: rule.phase,
            message,
            reason: event.reason.clone(),
            severity: if event.is_warning() {
                Severity::Warning
            } else {
                Severity::Info
            },
            related_object: event.involved.clone(),
        })
    }

    /// Retain an event and prune the window against the clock
    pub fn observe(&mut self, event: ObservedEvent) {
        let now = self.clock.now();
        self.window.push(event, now);
    }

    /// Re-prune without adding anything, e.g. on a timer tick
    pub fn prune(&mut self) {
        let now = self.clock.now();
        self.window.prune(now);
    }

    /// Retained in-scope events, newest first
    pub fn scoped_events(&self) -> Vec<ObservedEvent> {
        self.window
            .newest_first()
            .filter(|e| self.in_scope(e))
            .cloned()
            .collect()
    }

    pub fn window(&self) -> &RetainedEvents {
        &self.window
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
