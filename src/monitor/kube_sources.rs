//! # Kubernetes Collaborators
//!
//! `ResourceWatcher` and `EventsProvider` backed by the API server.
//!
//! Watches use `kube_runtime::watcher` with the default backoff, so transient
//! failures are reported on the stream and the watch keeps going. Dropping a
//! returned stream drops the underlying watch request.

use super::errors::WatchError;
use super::sources::{ChangeKind, EventStream, EventsProvider, ResourceDelta, ResourceStream, ResourceWatcher};
use crate::crd::{ClusterDeployment, ClusterDeploymentSpec};
use crate::progress::ObservedEvent;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::api::ListParams;
use kube::{Api, Client};
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use tracing::debug;

/// Reads and watches `ClusterDeployment` objects
#[derive(Clone)]
pub struct KubeResourceWatcher {
    client: Client,
}

impl std::fmt::Debug for KubeResourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceWatcher").finish_non_exhaustive()
    }
}

impl KubeResourceWatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceWatcher for KubeResourceWatcher {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ClusterDeployment>, WatchError> {
        let api: Api<ClusterDeployment> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| WatchError::Api(e.to_string()))
    }

    async fn watch(&self, namespace: &str, name: &str) -> Result<ResourceStream, WatchError> {
        let api: Api<ClusterDeployment> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));

        let mut tracker = RelistTracker::new(namespace, name);
        let stream = watcher(api, config)
            .default_backoff()
            .filter_map(move |event| {
                let delta = match event {
                    Ok(event) => tracker.map(event).map(Ok),
                    Err(e) => Some(Err(WatchError::Stream(e.to_string()))),
                };
                futures::future::ready(delta)
            })
            .boxed();

        debug!(
            resource.namespace = namespace,
            resource.name = name,
            "Opened ClusterDeployment watch"
        );
        Ok(stream)
    }
}

/// Maps watcher events for a single object to resource deltas
///
/// After a relist the watcher reports the current set as `Init`,
/// `InitApply*`, `InitDone` and sends no `Delete` for an object that vanished
/// while the watch was down. A relist that completes without the object is
/// therefore reported as a deletion.
#[derive(Debug)]
struct RelistTracker {
    namespace: String,
    name: String,
    last: Option<ClusterDeployment>,
    present: bool,
    listed_in_relist: bool,
}

impl RelistTracker {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            last: None,
            // The caller fetched the object right before opening the watch
            present: true,
            listed_in_relist: false,
        }
    }

    fn map(&mut self, event: watcher::Event<ClusterDeployment>) -> Option<ResourceDelta> {
        match event {
            watcher::Event::Init => {
                self.listed_in_relist = false;
                None
            }
            watcher::Event::InitApply(resource) => {
                self.listed_in_relist = true;
                Some(self.applied(resource))
            }
            watcher::Event::Apply(resource) => Some(self.applied(resource)),
            watcher::Event::Delete(resource) => {
                self.last = None;
                self.present = false;
                Some(ResourceDelta {
                    resource,
                    change: ChangeKind::Deleted,
                })
            }
            watcher::Event::InitDone => {
                if self.listed_in_relist || !self.present {
                    return None;
                }
                self.present = false;
                debug!(
                    resource.namespace = %self.namespace,
                    resource.name = %self.name,
                    "Relist completed without the object, reporting deletion"
                );
                let resource = self.last.take().unwrap_or_else(|| self.placeholder());
                Some(ResourceDelta {
                    resource,
                    change: ChangeKind::Deleted,
                })
            }
        }
    }

    fn applied(&mut self, resource: ClusterDeployment) -> ResourceDelta {
        let change = if self.last.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.last = Some(resource.clone());
        self.present = true;
        ResourceDelta { resource, change }
    }

    fn placeholder(&self) -> ClusterDeployment {
        let mut resource = ClusterDeployment::new(&self.name, ClusterDeploymentSpec::default());
        resource.metadata.namespace = Some(self.namespace.clone());
        resource
    }
}

/// Lists and watches core/v1 events in a namespace
#[derive(Clone)]
pub struct KubeEventsProvider {
    client: Client,
}

impl std::fmt::Debug for KubeEventsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventsProvider").finish_non_exhaustive()
    }
}

impl KubeEventsProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventsProvider for KubeEventsProvider {
    async fn list(&self, namespace: &str) -> Result<Vec<ObservedEvent>, WatchError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let events = api
            .list(&ListParams::default())
            .await
            .map_err(|e| WatchError::Api(e.to_string()))?;
        Ok(events.items.iter().map(ObservedEvent::from_kube).collect())
    }

    async fn watch_namespace(&self, namespace: &str) -> Result<EventStream, WatchError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);

        // The initial listing is taken through `list`; relist replays are skipped
        let stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(|event| {
                let observed = match event {
                    Ok(watcher::Event::Apply(event)) => Some(Ok(ObservedEvent::from_kube(&event))),
                    Ok(
                        watcher::Event::Delete(_)
                        | watcher::Event::Init
                        | watcher::Event::InitApply(_)
                        | watcher::Event::InitDone,
                    ) => None,
                    Err(e) => Some(Err(WatchError::Stream(e.to_string()))),
                };
                futures::future::ready(observed)
            })
            .boxed();

        debug!(resource.namespace = namespace, "Opened namespace event watch");
        Ok(stream)
    }
}
