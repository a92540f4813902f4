//! # Phase Classification
//!
//! Maps a deployment snapshot (plus recent in-scope events) to a single
//! [`ProvisioningPhase`] and a coarse completion estimate.
//!
//! Classification is always re-derived from the full snapshot. Nothing here
//! remembers the previous phase, so conditions arriving out of order cannot
//! cause a phase to regress.

use super::{
    ConditionSummary, DeploymentSnapshot, ObservedEvent, ProvisioningPhase, Severity,
};
use regex::Regex;
use std::sync::LazyLock;

pub const READY: &str = "Ready";
pub const INFRASTRUCTURE_READY: &str = "InfrastructureReady";
pub const CONTROL_PLANE_INITIALIZED: &str = "ControlPlaneInitialized";
pub const WORKERS_AVAILABLE: &str = "WorkersAvailable";
pub const FAILED: &str = "Failed";

const RECOGNIZED_CONDITIONS: &[&str] = &[
    READY,
    INFRASTRUCTURE_READY,
    CONTROL_PLANE_INITIALIZED,
    WORKERS_AVAILABLE,
    FAILED,
];

/// Ready=False reasons that mean provisioning has given up
const FAILURE_REASONS: &[&str] = &["Failed", "ProvisioningFailed", "DeploymentFailed"];

/// Subsidiary kind whose events carry service installation evidence
const SERVICE_SET_KIND: &str = "ServiceSet";

static SERVICE_INSTALLING_REASON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Service(s|Set)?Installing$")
        .expect("Failed to compile service installing pattern - this should never happen")
});

/// Completion estimates keyed by phase and the condition that backs them
const PROGRESS_TABLE: &[(ProvisioningPhase, &str, &str, u8)] = &[
    (ProvisioningPhase::Provisioning, INFRASTRUCTURE_READY, "False", 25),
    (ProvisioningPhase::Bootstrapping, CONTROL_PLANE_INITIALIZED, "False", 50),
    (ProvisioningPhase::Scaling, WORKERS_AVAILABLE, "True", 85),
    (ProvisioningPhase::Installing, WORKERS_AVAILABLE, "True", 90),
    (ProvisioningPhase::Ready, READY, "True", 100),
];

/// Classify a snapshot into one lifecycle phase
///
/// First match wins:
/// 1. explicit failure
/// 2. Ready=True
/// 3. service installation evidence in `recent_events`
/// 4. WorkersAvailable=False, once earlier stages are not pending
/// 5. ControlPlaneInitialized=False, once infrastructure is not pending
/// 6. InfrastructureReady=False
///
/// After that, completed stages imply the next one (infrastructure ready means
/// bootstrapping, an initialized control plane or any workers condition means
/// scaling). No recognized condition at all is `Initializing`; anything else
/// is `Unknown`.
pub fn detect_phase(
    snapshot: &DeploymentSnapshot,
    recent_events: &[ObservedEvent],
) -> ProvisioningPhase {
    if is_failed(snapshot) {
        return ProvisioningPhase::Failed;
    }
    if snapshot.condition(READY).is_some_and(ConditionSummary::is_true) {
        return ProvisioningPhase::Ready;
    }
    if recent_events.iter().any(is_service_installing_event) {
        return ProvisioningPhase::Installing;
    }

    let infra = snapshot.condition(INFRASTRUCTURE_READY);
    let control_plane = snapshot.condition(CONTROL_PLANE_INITIALIZED);
    let workers = snapshot.condition(WORKERS_AVAILABLE);

    let infra_pending = infra.is_some_and(ConditionSummary::is_false);
    let control_plane_pending = control_plane.is_some_and(ConditionSummary::is_false);

    if workers.is_some_and(ConditionSummary::is_false) && !infra_pending && !control_plane_pending
    {
        return ProvisioningPhase::Scaling;
    }
    if control_plane_pending && !infra_pending {
        return ProvisioningPhase::Bootstrapping;
    }
    if infra_pending {
        return ProvisioningPhase::Provisioning;
    }

    if workers.is_some() || control_plane.is_some_and(ConditionSummary::is_true) {
        return ProvisioningPhase::Scaling;
    }
    if infra.is_some_and(ConditionSummary::is_true) {
        return ProvisioningPhase::Bootstrapping;
    }

    let has_recognized = snapshot
        .conditions
        .iter()
        .any(|c| RECOGNIZED_CONDITIONS.contains(&c.r#type.as_str()));
    if has_recognized {
        ProvisioningPhase::Unknown
    } else {
        ProvisioningPhase::Initializing
    }
}

/// Rough completion percentage for a phase
///
/// Returns `None` when no table entry matches or when matching entries
/// disagree; a missing estimate is never reported as zero.
pub fn estimate_progress(
    phase: ProvisioningPhase,
    conditions: &[ConditionSummary],
) -> Option<u8> {
    let mut matched = PROGRESS_TABLE
        .iter()
        .filter(|(p, _, _, _)| *p == phase)
        .filter(|(_, condition_type, status, _)| {
            conditions
                .iter()
                .any(|c| c.r#type == *condition_type && c.status.eq_ignore_ascii_case(status))
        })
        .map(|(_, _, _, percent)| *percent);

    let first = matched.next()?;
    if matched.all(|other| other == first) {
        Some(first)
    } else {
        None
    }
}

/// Whether an event is evidence that add-on services are being installed
pub fn is_service_installing_event(event: &ObservedEvent) -> bool {
    event.involved.kind == SERVICE_SET_KIND && SERVICE_INSTALLING_REASON.is_match(&event.reason)
}

fn is_failed(snapshot: &DeploymentSnapshot) -> bool {
    if snapshot
        .status_phase
        .as_deref()
        .is_some_and(|p| p.eq_ignore_ascii_case(FAILED))
    {
        return true;
    }
    if snapshot.condition(FAILED).is_some_and(ConditionSummary::is_true) {
        return true;
    }
    snapshot
        .condition(READY)
        .is_some_and(|c| c.is_false() && FAILURE_REASONS.contains(&c.reason.as_str()))
}

/// Human readable description of a classified snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub message: String,
    pub reason: String,
    pub severity: Severity,
}

/// Describe a phase using the condition that drives it, falling back to a
/// fixed message when that condition carries none
pub fn summarize_phase(snapshot: &DeploymentSnapshot, phase: ProvisioningPhase) -> PhaseSummary {
    let (driving, default_message) = match phase {
        ProvisioningPhase::Failed => (
            snapshot
                .condition(FAILED)
                .filter(|c| c.is_true())
                .or_else(|| snapshot.condition(READY)),
            "Cluster deployment failed",
        ),
        ProvisioningPhase::Ready => (snapshot.condition(READY), "Cluster is ready"),
        ProvisioningPhase::Provisioning => (
            snapshot.condition(INFRASTRUCTURE_READY),
            "Provisioning infrastructure",
        ),
        ProvisioningPhase::Bootstrapping => (
            snapshot
                .condition(CONTROL_PLANE_INITIALIZED)
                .or_else(|| snapshot.condition(INFRASTRUCTURE_READY)),
            "Bootstrapping control plane",
        ),
        ProvisioningPhase::Scaling => {
            let workers = snapshot.condition(WORKERS_AVAILABLE);
            let message = if workers.is_some_and(ConditionSummary::is_true) {
                "Worker nodes available, waiting for cluster to become ready"
            } else {
                "Scaling worker nodes"
            };
            (workers, message)
        }
        ProvisioningPhase::Installing => (None, "Installing add-on services"),
        ProvisioningPhase::Initializing => (None, "Waiting for provisioning to start"),
        ProvisioningPhase::Unknown => (snapshot.condition(READY), "Waiting for cluster status"),
    };

    let message = driving
        .map(|c| c.message.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(default_message)
        .to_string();
    let reason = driving
        .map(|c| c.reason.as_str())
        .filter(|r| !r.is_empty())
        .unwrap_or(phase.as_str())
        .to_string();

    PhaseSummary {
        message,
        reason,
        severity: if phase == ProvisioningPhase::Failed {
            Severity::Error
        } else {
            Severity::Info
        },
    }
}
