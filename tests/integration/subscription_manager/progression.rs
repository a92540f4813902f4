//! Streamed progression, event overrides, coalescing and watch failures

use super::common::*;
use cluster_progress_monitor::monitor::{ChangeKind, WatchError};
use cluster_progress_monitor::progress::{ProvisioningPhase, Severity, UpdateSource};

#[tokio::test]
async fn test_end_to_end_progression_publishes_once_per_transition() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();

    let initial = harness.next_update().await;
    assert_eq!(initial.phase, ProvisioningPhase::Initializing);
    assert_eq!(initial.progress, None);

    let steps: [(&[(&str, &str)], ProvisioningPhase, Option<u8>); 4] = [
        (
            &[("InfrastructureReady", "True"), ("ControlPlaneInitialized", "False")],
            ProvisioningPhase::Bootstrapping,
            Some(50),
        ),
        (
            &[
                ("InfrastructureReady", "True"),
                ("ControlPlaneInitialized", "True"),
                ("WorkersAvailable", "False"),
            ],
            ProvisioningPhase::Scaling,
            None,
        ),
        (
            &[
                ("InfrastructureReady", "True"),
                ("ControlPlaneInitialized", "True"),
                ("WorkersAvailable", "True"),
            ],
            ProvisioningPhase::Scaling,
            Some(85),
        ),
        (
            &[
                ("InfrastructureReady", "True"),
                ("ControlPlaneInitialized", "True"),
                ("WorkersAvailable", "True"),
                ("Ready", "True"),
            ],
            ProvisioningPhase::Ready,
            Some(100),
        ),
    ];

    for (conditions, phase, progress) in steps {
        // Every snapshot arrives twice, as on a periodic resync
        for _ in 0..2 {
            harness
                .resources
                .send(deployment("prod-eu-1", conditions), ChangeKind::Modified);
        }
        let update = harness.next_update().await;
        assert_eq!(update.phase, phase);
        assert_eq!(update.progress, progress);
        assert_eq!(update.terminal, phase == ProvisioningPhase::Ready);
        if phase != ProvisioningPhase::Ready {
            harness.assert_quiet().await;
        }
    }

    harness.wait_closed(&target).await;
    harness.assert_quiet().await;
}

#[tokio::test]
async fn test_reason_only_changes_are_published() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    harness
        .manager
        .subscribe("ui", &target("prod-eu-1"), None)
        .await
        .unwrap();
    harness.next_update().await;

    for reason in ["WaitingForVPC", "WaitingForSubnets", "WaitingForLoadBalancer"] {
        let resource = deployment_with(
            "prod-eu-1",
            vec![condition("InfrastructureReady", "False", Some(reason))],
        );
        harness.resources.send(resource, ChangeKind::Modified);
        let update = harness.next_update().await;
        assert_eq!(update.phase, ProvisioningPhase::Provisioning);
        assert_eq!(update.reason, reason);
    }
    harness.assert_quiet().await;
}

#[tokio::test]
async fn test_service_installing_event_overrides_conditions() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    harness
        .manager
        .subscribe("ui", &target("prod-eu-1"), None)
        .await
        .unwrap();
    assert_eq!(harness.next_update().await.phase, ProvisioningPhase::Initializing);

    let now = harness.clock.now();
    harness
        .events
        .emit(event("ServiceSet", "prod-eu-1-x7k2", "ServiceInstalling", now));
    let update = harness.next_update().await;
    assert_eq!(update.phase, ProvisioningPhase::Installing);
    assert_eq!(update.source, UpdateSource::Event);
    assert_eq!(update.message, "ServiceInstalling on prod-eu-1-x7k2");
    assert_eq!(
        update.related_object.map(|o| o.name),
        Some("prod-eu-1-x7k2".to_string())
    );

    // A resync of the same conditions now classifies with the retained evidence
    harness
        .resources
        .send(deployment("prod-eu-1", &[]), ChangeKind::Modified);
    let resync = harness.next_update().await;
    assert_eq!(resync.phase, ProvisioningPhase::Installing);
    assert_eq!(resync.source, UpdateSource::Condition);
}

#[tokio::test]
async fn test_foreign_events_are_ignored() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    harness
        .manager
        .subscribe("ui", &target("prod-eu-1"), None)
        .await
        .unwrap();
    harness.next_update().await;

    let now = harness.clock.now();
    harness
        .events
        .emit(event("ServiceSet", "prod-eu-10-x7k2", "ServiceInstalling", now));
    harness
        .events
        .emit(event("ServiceSet", "prod-eu-1-x7k2", "Pulled", now));
    harness.assert_quiet().await;
}

#[tokio::test]
async fn test_seeded_events_reach_late_subscriber() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let now = harness.clock.now();
    harness.events.set_listing(vec![event(
        "ServiceSet",
        "prod-eu-1-x7k2",
        "ServiceSetInstalling",
        now - chrono::Duration::seconds(10),
    )]);

    harness
        .manager
        .subscribe("ui", &target("prod-eu-1"), None)
        .await
        .unwrap();

    // The seeded evidence is already folded into the initial classification
    let initial = harness.next_update().await;
    assert_eq!(initial.phase, ProvisioningPhase::Installing);
    assert_eq!(initial.source, UpdateSource::Condition);
    harness.assert_quiet().await;
}

#[tokio::test]
async fn test_seeded_event_replays_when_it_moves_the_phase() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let now = harness.clock.now();
    harness.events.set_listing(vec![event(
        "ClusterDeployment",
        "prod-eu-1",
        "InfrastructureProvisioning",
        now - chrono::Duration::seconds(10),
    )]);

    harness
        .manager
        .subscribe("ui", &target("prod-eu-1"), None)
        .await
        .unwrap();

    let initial = harness.next_update().await;
    assert_eq!(initial.phase, ProvisioningPhase::Initializing);
    let replayed = harness.next_update().await;
    assert_eq!(replayed.phase, ProvisioningPhase::Provisioning);
    assert_eq!(replayed.source, UpdateSource::Event);
    harness.assert_quiet().await;
}

#[tokio::test]
async fn test_stale_listed_event_does_not_override() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment(
        "prod-eu-1",
        &[
            ("InfrastructureReady", "True"),
            ("ControlPlaneInitialized", "True"),
            ("WorkersAvailable", "False"),
        ],
    ));
    let now = harness.clock.now();
    harness.events.set_listing(vec![event(
        "ServiceSet",
        "prod-eu-1-x7k2",
        "ServiceInstalling",
        now - chrono::Duration::minutes(30),
    )]);

    harness
        .manager
        .subscribe("ui", &target("prod-eu-1"), None)
        .await
        .unwrap();

    let initial = harness.next_update().await;
    assert_eq!(initial.phase, ProvisioningPhase::Scaling);
    assert_eq!(initial.source, UpdateSource::Condition);
    harness.assert_quiet().await;
}

#[tokio::test]
async fn test_event_stream_error_is_a_non_terminal_warning() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    harness.next_update().await;

    harness
        .events
        .emit_error(WatchError::Stream("410 Gone: too old resource version".to_string()));
    let warning = harness.next_update().await;
    assert!(!warning.terminal);
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.reason, "EventStreamError");
    assert!(harness.manager.is_subscribed(&target));

    // The subscription keeps streaming conditions
    harness.resources.send(
        deployment("prod-eu-1", &[("InfrastructureReady", "False")]),
        ChangeKind::Modified,
    );
    assert_eq!(harness.next_update().await.phase, ProvisioningPhase::Provisioning);
}

#[tokio::test]
async fn test_transient_resource_error_keeps_streaming() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    harness.next_update().await;

    harness.resources.send_error(
        NAMESPACE,
        "prod-eu-1",
        WatchError::Stream("429 Too Many Requests".to_string()),
    );
    harness.assert_quiet().await;
    assert!(harness.manager.is_subscribed(&target));
}

#[tokio::test]
async fn test_fatal_resource_error_ends_subscription() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    harness.next_update().await;

    harness.resources.send_error(
        NAMESPACE,
        "prod-eu-1",
        WatchError::Stream("403 Forbidden".to_string()),
    );
    let failed = harness.next_update().await;
    assert!(failed.terminal);
    assert_eq!(failed.severity, Severity::Error);
    assert_eq!(failed.reason, "WatchFailed");

    harness.wait_closed(&target).await;
    assert_eq!(harness.manager.limiter().in_use(), 0);
}

#[tokio::test]
async fn test_closed_resource_watch_ends_subscription() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    harness.next_update().await;

    harness.resources.close(NAMESPACE, "prod-eu-1");
    let closed = harness.next_update().await;
    assert!(closed.terminal);
    assert_eq!(closed.severity, Severity::Warning);
    assert_eq!(closed.reason, "WatchClosed");
    harness.wait_closed(&target).await;
}

#[tokio::test]
async fn test_failure_condition_is_terminal_error() {
    let mut harness = Harness::new();
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    harness.next_update().await;

    let resource = deployment_with(
        "prod-eu-1",
        vec![
            condition("InfrastructureReady", "False", Some("VPCQuotaExceeded")),
            condition("Ready", "False", Some("ProvisioningFailed")),
        ],
    );
    harness.resources.send(resource, ChangeKind::Modified);
    let failed = harness.next_update().await;
    assert_eq!(failed.phase, ProvisioningPhase::Failed);
    assert!(failed.terminal);
    assert_eq!(failed.severity, Severity::Error);
    harness.wait_closed(&target).await;
}
