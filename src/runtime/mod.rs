//! # Runtime
//!
//! Process startup and the watch error policy.

pub mod error_policy;
pub mod initialization;

pub use error_policy::{classify_watch_error, log_watch_error, WatchErrorKind};
pub use initialization::{init_logging, initialize, InitializationResult};
