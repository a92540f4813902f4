//! # Metrics
//!
//! Prometheus metrics for subscriptions, published updates and watch health.

mod monitor_metrics;
mod registry;

pub use monitor_metrics::*;
pub use registry::{gather_text, register_metrics};
