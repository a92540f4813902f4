//! # Observability
//!
//! Prometheus metrics and the HTTP probe server.

pub mod metrics;
pub mod server;
