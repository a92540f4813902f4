//! # Monitor
//!
//! Subscription management: turns watches of a ClusterDeployment and its
//! namespace events into a coalesced stream of [`ProgressUpdate`]s delivered
//! to a [`ProgressSink`].
//!
//! [`ProgressUpdate`]: crate::progress::ProgressUpdate

pub mod authz;
pub mod errors;
pub mod kube_sources;
pub mod manager;
pub mod quota;
pub mod sources;
pub mod subscription;
pub mod target;

pub use authz::NamespaceFilter;
pub use errors::{CapacityError, MonitorError, MonitorResult, WatchError};
pub use kube_sources::{KubeEventsProvider, KubeResourceWatcher};
pub use manager::{SubscribeOutcome, SubscriptionManager};
pub use quota::{CapacityLimiter, CapacitySlot};
pub use sources::{
    ChangeKind, ChannelSink, EventStream, EventsProvider, ProgressSink, ResourceDelta,
    ResourceStream, ResourceWatcher, SinkError,
};
pub use subscription::{Subscription, SubscriptionTiming, TickOutcome};
pub use target::{parse_timeout_secs, SubscriptionRequest, SubscriptionTarget};
