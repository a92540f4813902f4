//! Subscription manager integration tests
//!
//! Organized by concern: setup and quotas, streamed progression, and timers.

pub mod common;
mod progression;
mod timeouts;
