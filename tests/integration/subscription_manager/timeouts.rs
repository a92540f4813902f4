//! Monitoring window, stall diagnostics and event ageing
//!
//! The bookkeeping timer runs every few milliseconds here while deadlines and
//! retention follow the manual clock.

use super::common::*;
use cluster_progress_monitor::config::MonitorConfig;
use cluster_progress_monitor::monitor::ChangeKind;
use cluster_progress_monitor::progress::{ProvisioningPhase, Severity, UpdateSource};
use std::time::Duration;

fn fast_ticks() -> MonitorConfig {
    MonitorConfig {
        tick_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_timeout_warning_then_terminal_timeout() {
    let mut harness = Harness::with_config(fast_ticks());
    harness.resources.insert(deployment("prod-eu-1", &[("InfrastructureReady", "False")]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    assert_eq!(harness.next_update().await.phase, ProvisioningPhase::Provisioning);

    harness.clock.advance(chrono::Duration::minutes(56));
    let warning = harness.next_update().await;
    assert!(!warning.terminal);
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.source, UpdateSource::System);
    assert_eq!(warning.phase, ProvisioningPhase::Provisioning);
    // One-shot
    harness.assert_quiet().await;

    harness.clock.advance(chrono::Duration::minutes(5));
    let expired = harness.next_update().await;
    assert!(expired.terminal);
    assert_eq!(expired.severity, Severity::Warning);
    assert_eq!(expired.reason, "MonitoringTimeout");

    harness.wait_closed(&target).await;
    assert_eq!(harness.manager.limiter().in_use(), 0);
}

#[tokio::test]
async fn test_requested_timeout_overrides_default() {
    let mut harness = Harness::with_config(fast_ticks());
    harness.resources.insert(deployment("prod-eu-1", &[]));
    let target = target("prod-eu-1");
    harness
        .manager
        .subscribe("ui", &target, Some(Duration::from_secs(600)))
        .await
        .unwrap();
    harness.next_update().await;
    harness.assert_quiet().await;

    harness.clock.advance(chrono::Duration::seconds(301));
    let warning = harness.next_update().await;
    assert!(!warning.terminal);

    harness.clock.advance(chrono::Duration::seconds(300));
    let expired = harness.next_update().await;
    assert!(expired.terminal);
    harness.wait_closed(&target).await;
}

#[tokio::test]
async fn test_stall_never_publishes_or_terminates() {
    let mut harness = Harness::with_config(fast_ticks());
    harness.resources.insert(deployment("prod-eu-1", &[("InfrastructureReady", "False")]));
    let target = target("prod-eu-1");
    harness.manager.subscribe("ui", &target, None).await.unwrap();
    harness.next_update().await;

    harness.clock.advance(chrono::Duration::minutes(30));
    harness.assert_quiet().await;
    assert!(harness.manager.is_subscribed(&target));
}

#[tokio::test]
async fn test_event_evidence_ages_out_of_the_window() {
    let mut harness = Harness::with_config(fast_ticks());
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
        .emit(event("ServiceSet", "prod-eu-1-x7k2", "ServiceInstalling", now));
    assert_eq!(harness.next_update().await.phase, ProvisioningPhase::Installing);

    // Past the two minute retention; let a tick prune the window
    harness.clock.advance(chrono::Duration::minutes(3));
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness
        .resources
        .send(deployment("prod-eu-1", &[]), ChangeKind::Modified);
    let resync = harness.next_update().await;
    assert_eq!(resync.phase, ProvisioningPhase::Initializing);
}
