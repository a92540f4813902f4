//! Shared fakes and helpers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cluster_progress_monitor::config::MonitorConfig;
use cluster_progress_monitor::crd::{
    ClusterDeployment, ClusterDeploymentSpec, ClusterDeploymentStatus, Condition,
};
use cluster_progress_monitor::monitor::{
    ChangeKind, ChannelSink, EventStream, EventsProvider, ResourceDelta, ResourceStream,
    ResourceWatcher, SubscriptionManager, SubscriptionTarget, WatchError,
};
use cluster_progress_monitor::progress::{ManualClock, ObjectRef, ObservedEvent, ProgressUpdate};
pub use cluster_progress_monitor::progress::Clock;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

pub const NAMESPACE: &str = "kcm-system";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Resource watcher backed by in-memory objects and test-driven streams
#[derive(Default)]
pub struct FakeResourceWatcher {
    resources: Mutex<HashMap<Key, ClusterDeployment>>,
    streams: Mutex<HashMap<Key, UnboundedSender<Result<ResourceDelta, WatchError>>>>,
    watch_calls: AtomicUsize,
    fail_watch: Mutex<Option<WatchError>>,
    get_delay: Mutex<Option<Duration>>,
}

impl FakeResourceWatcher {
    pub fn insert(&self, resource: ClusterDeployment) {
        let namespace = resource.metadata.namespace.clone().unwrap_or_default();
        let name = resource.metadata.name.clone().unwrap_or_default();
        self.resources.lock().unwrap().insert((namespace, name), resource);
    }

    pub fn fail_next_watch(&self, error: WatchError) {
        *self.fail_watch.lock().unwrap() = Some(error);
    }

    /// Make every `get` take this long, to widen setup races
    pub fn delay_gets(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Push a change into the open watch for the resource
    pub fn send(&self, resource: ClusterDeployment, change: ChangeKind) {
        let namespace = resource.metadata.namespace.clone().unwrap_or_default();
        let name = resource.metadata.name.clone().unwrap_or_default();
        let streams = self.streams.lock().unwrap();
        let sender = streams
            .get(&(namespace, name))
            .expect("no open watch for resource");
        // The worker may already have ended on an earlier terminal update
        let _ = sender.unbounded_send(Ok(ResourceDelta { resource, change }));
    }

    pub fn send_error(&self, namespace: &str, name: &str, error: WatchError) {
        let streams = self.streams.lock().unwrap();
        let _ = streams
            .get(&key(namespace, name))
            .expect("no open watch for resource")
            .unbounded_send(Err(error));
    }

    /// End the watch stream as if the API server closed it
    pub fn close(&self, namespace: &str, name: &str) {
        self.streams.lock().unwrap().remove(&key(namespace, name));
    }

    /// Whether the subscriber still holds the receiving end
    pub fn watch_is_open(&self, namespace: &str, name: &str) -> bool {
        self.streams
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .is_some_and(|sender| !sender.is_closed())
    }
}

#[async_trait]
impl ResourceWatcher for FakeResourceWatcher {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDeployment>, WatchError> {
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.resources.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn watch(&self, namespace: &str, name: &str) -> Result<ResourceStream, WatchError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_watch.lock().unwrap().take() {
            return Err(error);
        }
        let (sender, receiver) = unbounded();
        self.streams.lock().unwrap().insert(key(namespace, name), sender);
        Ok(receiver.boxed())
    }
}

/// Events provider with a static listing and a broadcast to live watches
#[derive(Default)]
pub struct FakeEventsProvider {
    listing: Mutex<Vec<ObservedEvent>>,
    watchers: Mutex<Vec<UnboundedSender<Result<ObservedEvent, WatchError>>>>,
}

impl FakeEventsProvider {
    pub fn set_listing(&self, events: Vec<ObservedEvent>) {
        *self.listing.lock().unwrap() = events;
    }

    pub fn emit(&self, event: ObservedEvent) {
        self.broadcast(Ok(event));
    }

    pub fn emit_error(&self, error: WatchError) {
        self.broadcast(Err(error));
    }

    fn broadcast(&self, item: Result<ObservedEvent, WatchError>) {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|sender| sender.unbounded_send(item.clone()).is_ok());
    }
}

#[async_trait]
impl EventsProvider for FakeEventsProvider {
    async fn list(&self, _namespace: &str) -> Result<Vec<ObservedEvent>, WatchError> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn watch_namespace(&self, _namespace: &str) -> Result<EventStream, WatchError> {
        let (sender, receiver) = unbounded();
        self.watchers.lock().unwrap().push(sender);
        Ok(receiver.boxed())
    }
}

/// Manager wired to fakes, plus the receiving end of its sink
pub struct Harness {
    pub manager: Arc<SubscriptionManager>,
    pub resources: Arc<FakeResourceWatcher>,
    pub events: Arc<FakeEventsProvider>,
    pub clock: Arc<ManualClock>,
    pub updates: Receiver<(SubscriptionTarget, ProgressUpdate)>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        let (manager, resources, events, clock) = unbound_manager(config);
        let (sink, updates) = ChannelSink::new(64);
        manager.bind(Arc::new(sink));
        Self {
            manager: Arc::new(manager),
            resources,
            events,
            clock,
            updates,
        }
    }

    /// Next published update, failing the test after a generous wait
    pub async fn next_update(&mut self) -> ProgressUpdate {
        let (_, update) = tokio::time::timeout(Duration::from_secs(5), self.updates.recv())
            .await
            .expect("timed out waiting for a progress update")
            .expect("sink channel closed");
        update
    }

    /// Assert nothing else gets published for a short while
    pub async fn assert_quiet(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok((_, update)) = self.updates.try_recv() {
            panic!("unexpected update: {update:?}");
        }
    }

    /// Wait until the worker for `target` has left the registry
    pub async fn wait_closed(&self, target: &SubscriptionTarget) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.manager.is_subscribed(target) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription did not tear down");
    }
}

pub fn unbound_manager(
    config: MonitorConfig,
) -> (
    SubscriptionManager,
    Arc<FakeResourceWatcher>,
    Arc<FakeEventsProvider>,
    Arc<ManualClock>,
) {
    let resources = Arc::new(FakeResourceWatcher::default());
    let events = Arc::new(FakeEventsProvider::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let manager = SubscriptionManager::new(resources.clone(), events.clone(), config)
        .expect("valid config")
        .with_clock(clock.clone());
    (manager, resources, events, clock)
}

pub fn target(name: &str) -> SubscriptionTarget {
    SubscriptionTarget::new(NAMESPACE, name)
}

/// A ClusterDeployment with the given `(type, status)` conditions
pub fn deployment(name: &str, conditions: &[(&str, &str)]) -> ClusterDeployment {
    deployment_with(name, conditions.iter().map(|(t, s)| condition(t, s, None)).collect())
}

pub fn deployment_with(name: &str, conditions: Vec<Condition>) -> ClusterDeployment {
    let mut resource = ClusterDeployment::new(
        name,
        ClusterDeploymentSpec {
            template: "aws-standalone-cp-1-0-0".to_string(),
            credential: Some("aws-cred".to_string()),
            config: Some(serde_json::json!({ "region": "eu-west-1" })),
            ..Default::default()
        },
    );
    resource.metadata.namespace = Some(NAMESPACE.to_string());
    resource.status = Some(ClusterDeploymentStatus {
        conditions,
        ..Default::default()
    });
    resource
}

pub fn condition(condition_type: &str, status: &str, reason: Option<&str>) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: None,
        reason: reason.map(ToString::to_string),
        message: None,
    }
}

pub fn event(kind: &str, name: &str, reason: &str, at: DateTime<Utc>) -> ObservedEvent {
    ObservedEvent {
        involved: ObjectRef {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: Some(NAMESPACE.to_string()),
        },
        reason: reason.to_string(),
        message: format!("{reason} on {name}"),
        event_type: "Normal".to_string(),
        last_seen: Some(at),
        ..Default::default()
    }
}
