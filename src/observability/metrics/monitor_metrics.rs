//! # Monitor Metrics
//!
//! Subscription lifecycle, update delivery and watch diagnostics.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Subscription lifecycle
static ACTIVE_SUBSCRIPTIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "cluster_progress_active_subscriptions",
        "Current number of streaming subscriptions",
    )
    .expect("Failed to create ACTIVE_SUBSCRIPTIONS metric - this should never happen")
});

static SUBSCRIPTIONS_OPENED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_progress_subscriptions_opened_total",
        "Total number of subscriptions that started streaming",
    )
    .expect("Failed to create SUBSCRIPTIONS_OPENED_TOTAL metric - this should never happen")
});

static SUBSCRIPTIONS_REJECTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_progress_subscriptions_rejected_total",
            "Total number of rejected subscribe calls",
        ),
        &["reason"],
    )
    .expect("Failed to create SUBSCRIPTIONS_REJECTED_TOTAL metric - this should never happen")
});

static SUBSCRIPTIONS_CLOSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_progress_subscriptions_closed_total",
            "Total number of subscriptions that stopped streaming",
        ),
        &["reason"],
    )
    .expect("Failed to create SUBSCRIPTIONS_CLOSED_TOTAL metric - this should never happen")
});

// Update delivery
static UPDATES_PUBLISHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_progress_updates_published_total",
            "Total number of progress updates handed to the sink",
        ),
        &["phase"],
    )
    .expect("Failed to create UPDATES_PUBLISHED_TOTAL metric - this should never happen")
});

static UPDATES_COALESCED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_progress_updates_coalesced_total",
        "Total number of updates dropped as duplicates of the last published one",
    )
    .expect("Failed to create UPDATES_COALESCED_TOTAL metric - this should never happen")
});

static PUBLISH_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_progress_publish_failures_total",
        "Total number of updates the sink refused",
    )
    .expect("Failed to create PUBLISH_FAILURES_TOTAL metric - this should never happen")
});

// Watch diagnostics
static WATCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_progress_watch_errors_total",
            "Total number of watch stream errors",
        ),
        &["stream", "kind"],
    )
    .expect("Failed to create WATCH_ERRORS_TOTAL metric - this should never happen")
});

static STALLS_DETECTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_progress_stalls_detected_total",
        "Total number of subscriptions whose conditions stopped changing",
    )
    .expect("Failed to create STALLS_DETECTED_TOTAL metric - this should never happen")
});

/// Register monitor metrics with the registry
pub(crate) fn register_monitor_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ACTIVE_SUBSCRIPTIONS.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTIONS_OPENED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTIONS_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTIONS_CLOSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPDATES_PUBLISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPDATES_COALESCED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STALLS_DETECTED_TOTAL.clone()))?;
    Ok(())
}

pub fn subscription_opened() {
    SUBSCRIPTIONS_OPENED_TOTAL.inc();
    ACTIVE_SUBSCRIPTIONS.inc();
}

pub fn subscription_closed(reason: &str) {
    SUBSCRIPTIONS_CLOSED_TOTAL.with_label_values(&[reason]).inc();
    ACTIVE_SUBSCRIPTIONS.dec();
}

pub fn increment_subscriptions_rejected(reason: &str) {
    SUBSCRIPTIONS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_updates_published(phase: &str) {
    UPDATES_PUBLISHED_TOTAL.with_label_values(&[phase]).inc();
}

pub fn increment_updates_coalesced() {
    UPDATES_COALESCED_TOTAL.inc();
}

pub fn increment_publish_failures() {
    PUBLISH_FAILURES_TOTAL.inc();
}

pub fn increment_watch_errors(stream: &str, kind: &str) {
    WATCH_ERRORS_TOTAL.with_label_values(&[stream, kind]).inc();
}

pub fn increment_stalls_detected() {
    STALLS_DETECTED_TOTAL.inc();
}

pub fn active_subscriptions() -> i64 {
    ACTIVE_SUBSCRIPTIONS.get()
}
