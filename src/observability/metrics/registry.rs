//! # Metrics Registry
//!
//! Prometheus registry shared by every metric in the crate.

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the Prometheus registry
///
/// Safe to call more than once; only the first call registers. Metrics are
/// cloned into the registry, which only bumps the internal `Arc` counts.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    let mut result = Ok(());
    REGISTER_ONCE.call_once(|| {
        result = super::monitor_metrics::register_monitor_metrics();
    });
    result
}

/// Render every registered metric in the Prometheus text format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
