//! # Subscription State
//!
//! All mutable state of one streamed ClusterDeployment. A `Subscription` is
//! owned by exactly one worker task and never shared, so none of its fields
//! need locking.

use super::sources::{ChangeKind, ResourceDelta};
use super::target::SubscriptionTarget;
use crate::progress::{
    detect_phase, estimate_progress, summarize_phase, Clock, DeploymentSnapshot,
    EventScopeFilter, ObservedEvent, ProgressUpdate, ProvisioningPhase, Severity, UpdateSource,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// What the last published update said, for coalescing
#[derive(Debug, Clone, PartialEq, Eq)]
struct PublishedKey {
    phase: ProvisioningPhase,
    message: String,
    reason: String,
}

/// Timer bookkeeping result
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Continue,
    /// One-shot warning ahead of the deadline
    Warning(ProgressUpdate),
    /// Deadline reached; the update is terminal
    Expired(ProgressUpdate),
}

/// Timing knobs copied from configuration
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionTiming {
    pub timeout: Duration,
    pub warning_lead: Duration,
    pub stall_threshold: Duration,
}

#[derive(Debug)]
pub struct Subscription {
    target: SubscriptionTarget,
    caller: String,
    filter: EventScopeFilter,
    clock: Arc<dyn Clock>,
    last_snapshot: Option<DeploymentSnapshot>,
    phase: ProvisioningPhase,
    last_published: Option<PublishedKey>,
    timeout: Duration,
    deadline: DateTime<Utc>,
    warning_lead: chrono::Duration,
    timeout_warned: bool,
    stall_threshold: chrono::Duration,
    last_condition_change: DateTime<Utc>,
    stall_reported: bool,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

impl Subscription {
    pub fn new(
        target: SubscriptionTarget,
        caller: impl Into<String>,
        filter: EventScopeFilter,
        timing: SubscriptionTiming,
    ) -> Self {
        let clock = Arc::clone(filter.clock());
        let now = clock.now();
        let timeout = to_chrono(timing.timeout);
        Self {
            target,
            caller: caller.into(),
            filter,
            clock,
            last_snapshot: None,
            phase: ProvisioningPhase::Unknown,
            last_published: None,
            timeout: timing.timeout,
            deadline: now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC),
            warning_lead: to_chrono(timing.warning_lead),
            timeout_warned: false,
            stall_threshold: to_chrono(timing.stall_threshold),
            last_condition_change: now,
            stall_reported: false,
        }
    }

    pub fn target(&self) -> &SubscriptionTarget {
        &self.target
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn phase(&self) -> ProvisioningPhase {
        self.phase
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Seed the retained window with a listing of namespace events
    ///
    /// Keeps at most `limit` of the newest events. Returns the newest retained
    /// in-scope event that matches a rule so it can be replayed once the
    /// resource snapshot is known. Events already past the retention age are
    /// never returned.
    pub fn seed_events(&mut self, mut events: Vec<ObservedEvent>, limit: usize) -> Option<ObservedEvent> {
        events.sort_by_key(ObservedEvent::timestamp);
        let skip = events.len().saturating_sub(limit);
        for event in events.into_iter().skip(skip) {
            self.filter.observe(event);
        }

        self.filter
            .scoped_events()
            .into_iter()
            .find(|e| self.filter.evaluate(e).is_some())
    }

    /// Evaluate an already retained event against the current snapshot
    pub fn replay_event(&mut self, event: &ObservedEvent) -> Option<ProgressUpdate> {
        let update = self.evaluate_event(event)?;
        self.phase = update.phase;
        Some(update)
    }

    /// Turn a resource watch delta into an update
    ///
    /// Deletion always ends the stream with a warning, whatever the last
    /// known conditions said.
    pub fn apply_resource(&mut self, delta: &ResourceDelta) -> ProgressUpdate {
        let now = self.clock.now();
        if delta.change == ChangeKind::Deleted {
            let mut update = ProgressUpdate::new(
                now,
                self.phase,
                format!("ClusterDeployment {} was deleted", self.target),
                "ResourceDeleted",
                UpdateSource::System,
            )
            .with_severity(Severity::Warning)
            .ending_stream();
            if let Some(snapshot) = &self.last_snapshot {
                update = update.with_snapshot(snapshot);
            }
            return update;
        }

        let snapshot = DeploymentSnapshot::from_resource(&delta.resource);
        let conditions_changed = self
            .last_snapshot
            .as_ref()
            .is_none_or(|previous| previous.conditions != snapshot.conditions);
        if conditions_changed {
            self.last_condition_change = now;
            self.stall_reported = false;
        }

        let update = condition_update(&snapshot, &self.filter.scoped_events(), now);
        self.phase = update.phase;
        self.last_snapshot = Some(snapshot);
        update
    }

    /// Retain an event and, if it maps to a phase override, build an update
    pub fn apply_event(&mut self, event: ObservedEvent) -> Option<ProgressUpdate> {
        let update = self.evaluate_event(&event);
        self.filter.observe(event);
        if let Some(update) = &update {
            self.phase = update.phase;
        }
        update
    }

    fn evaluate_event(&self, event: &ObservedEvent) -> Option<ProgressUpdate> {
        let evaluation = self.filter.evaluate(event)?;
        let snapshot = self.last_snapshot.clone().unwrap_or_default();

        // The override never beats a terminal classification of the full snapshot
        let mut scoped = self.filter.scoped_events();
        scoped.push(event.clone());
        let classified = detect_phase(&snapshot, &scoped);
        let phase = if classified.is_terminal() {
            classified
        } else {
            evaluation.phase
        };

        let mut update = ProgressUpdate::new(
            evaluation.timestamp,
            phase,
            evaluation.message,
            evaluation.reason,
            UpdateSource::Event,
        )
        .with_snapshot(&snapshot)
        .with_progress(estimate_progress(phase, &snapshot.conditions));
        if phase != ProvisioningPhase::Failed {
            update.severity = evaluation.severity;
        }
        update.related_object = Some(evaluation.related_object);
        Some(update)
    }

    /// Non-terminal warning for a failing event stream
    pub fn event_stream_warning(&self, error: &str) -> ProgressUpdate {
        self.system_update(
            format!("Event stream error, continuing without event context: {error}"),
            "EventStreamError",
            Severity::Warning,
        )
    }

    /// Terminal update for a fatal resource watch error
    pub fn watch_failed(&self, error: &str) -> ProgressUpdate {
        self.system_update(
            format!("Resource watch failed: {error}"),
            "WatchFailed",
            Severity::Error,
        )
        .ending_stream()
    }

    /// Terminal update for a resource watch that ended on its own
    pub fn watch_closed(&self) -> ProgressUpdate {
        self.system_update(
            "Resource watch closed unexpectedly".to_string(),
            "WatchClosed",
            Severity::Warning,
        )
        .ending_stream()
    }

    fn system_update(&self, message: String, reason: &str, severity: Severity) -> ProgressUpdate {
        let mut update = ProgressUpdate::new(
            self.clock.now(),
            self.phase,
            message,
            reason,
            UpdateSource::System,
        )
        .with_severity(severity);
        // A system notice is never terminal because of the phase it carries
        update.terminal = false;
        if let Some(snapshot) = &self.last_snapshot {
            update = update.with_snapshot(snapshot);
        }
        update
    }

    /// Periodic bookkeeping: prune events, report stalls, enforce the deadline
    pub fn tick(&mut self) -> TickOutcome {
        self.filter.prune();
        let now = self.clock.now();

        if !self.stall_reported && now - self.last_condition_change >= self.stall_threshold {
            self.stall_reported = true;
            crate::observability::metrics::increment_stalls_detected();
            warn!(
                resource.namespace = %self.target.namespace,
                resource.name = %self.target.name,
                phase = %self.phase,
                "No condition change for {}s, provisioning may be stalled",
                (now - self.last_condition_change).num_seconds()
            );
        }

        if now >= self.deadline {
            return TickOutcome::Expired(
                self.system_update(
                    format!(
                        "Monitoring window of {}s elapsed; subscribe again to keep watching",
                        self.timeout.as_secs()
                    ),
                    "MonitoringTimeout",
                    Severity::Warning,
                )
                .ending_stream(),
            );
        }

        let warn_at = self
            .deadline
            .checked_sub_signed(self.warning_lead)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if !self.timeout_warned && now >= warn_at {
            self.timeout_warned = true;
            let remaining = (self.deadline - now).num_seconds().max(0);
            return TickOutcome::Warning(self.system_update(
                format!("Monitoring window ends in {remaining}s"),
                "MonitoringTimeoutWarning",
                Severity::Warning,
            ));
        }

        TickOutcome::Continue
    }

    /// Coalescing rule: publish the first update, terminal updates, and any
    /// change of phase, message or reason
    pub fn should_publish(&self, update: &ProgressUpdate) -> bool {
        let Some(last) = &self.last_published else {
            return true;
        };
        update.terminal
            || update.phase != last.phase
            || update.message != last.message
            || update.reason != last.reason
    }

    pub fn record_published(&mut self, update: &ProgressUpdate) {
        self.last_published = Some(PublishedKey {
            phase: update.phase,
            message: update.message.clone(),
            reason: update.reason.clone(),
        });
    }
}

/// Build the condition-derived update for a snapshot
///
/// Shared by the streaming path and the point-read path.
pub fn condition_update(
    snapshot: &DeploymentSnapshot,
    scoped_events: &[ObservedEvent],
    now: DateTime<Utc>,
) -> ProgressUpdate {
    let phase = detect_phase(snapshot, scoped_events);
    let summary = summarize_phase(snapshot, phase);
    ProgressUpdate::new(now, phase, summary.message, summary.reason, UpdateSource::Condition)
        .with_severity(summary.severity)
        .with_progress(estimate_progress(phase, &snapshot.conditions))
        .with_snapshot(snapshot)
}
