//! # Collaborators
//!
//! Interfaces the subscription manager consumes (resource and event watches)
//! and the one it publishes to (progress sink).

use super::errors::WatchError;
use super::target::SubscriptionTarget;
use crate::crd::ClusterDeployment;
use crate::progress::{ObservedEvent, ProgressUpdate};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// How a watched resource changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One change delivered by a resource watch
#[derive(Debug, Clone)]
pub struct ResourceDelta {
    pub resource: ClusterDeployment,
    pub change: ChangeKind,
}

/// Stream of resource changes; errors are interleaved with deltas
pub type ResourceStream = BoxStream<'static, Result<ResourceDelta, WatchError>>;

/// Stream of namespace events; errors are interleaved with events
pub type EventStream = BoxStream<'static, Result<ObservedEvent, WatchError>>;

/// Point reads and watches of ClusterDeployment resources
///
/// Dropping a returned stream must stop the underlying watch.
#[async_trait]
pub trait ResourceWatcher: Send + Sync {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>, WatchError>;

    async fn watch(&self, namespace: &str, name: &str) -> Result<ResourceStream, WatchError>;
}

/// Listing and watching of namespace events
///
/// Dropping a returned stream must stop the underlying watch.
#[async_trait]
pub trait EventsProvider: Send + Sync {
    async fn list(&self, namespace: &str) -> Result<Vec<ObservedEvent>, WatchError>;

    async fn watch_namespace(&self, namespace: &str) -> Result<EventStream, WatchError>;
}

/// Outbound delivery of progress updates to observers
///
/// Delivery is one-way and best-effort. Implementations must not block the
/// caller waiting on an observer; an `Err` means the update was dropped.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, target: &SubscriptionTarget, update: ProgressUpdate) -> Result<(), SinkError>;
}

/// Why a sink could not accept an update
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("observer disconnected")]
    Disconnected,

    #[error("observer queue is full")]
    Full,
}

/// Sink backed by a bounded tokio channel
///
/// Uses `try_send` so a slow reader loses updates instead of stalling the
/// subscription worker.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: tokio::sync::mpsc::Sender<(SubscriptionTarget, ProgressUpdate)>,
}

impl ChannelSink {
    pub fn new(
        capacity: usize,
    ) -> (
        Self,
        tokio::sync::mpsc::Receiver<(SubscriptionTarget, ProgressUpdate)>,
    ) {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, target: &SubscriptionTarget, update: ProgressUpdate) -> Result<(), SinkError> {
        use tokio::sync::mpsc::error::TrySendError;

        self.sender
            .try_send((target.clone(), update))
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::Full,
                TrySendError::Closed(_) => SinkError::Disconnected,
            })
    }
}
