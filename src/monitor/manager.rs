//! # Subscription Manager
//!
//! Owns the registry of active subscriptions and one worker task per
//! subscription.
//!
//! ## Lifecycle
//!
//! `subscribe` validates and authorizes the target, reserves the registry key
//! and a capacity slot, fetches the resource once, opens the watches and
//! publishes the initial update before spawning the worker. The worker
//! multiplexes the resource stream, the event stream, a bookkeeping timer and
//! its cancellation signal until a terminal update, a fatal watch error, a
//! closed resource watch, the deadline, or cancellation. On the way out it
//! releases its capacity slot, leaves the registry and signals completion.
//!
//! The registry mutex is only held for membership changes, never across I/O.

use super::authz::NamespaceFilter;
use super::errors::{MonitorError, MonitorResult, WatchError};
use super::quota::{CapacityLimiter, CapacitySlot};
use super::sources::{
    ChangeKind, EventStream, EventsProvider, ProgressSink, ResourceDelta, ResourceStream,
    ResourceWatcher,
};
use super::subscription::{condition_update, Subscription, SubscriptionTiming, TickOutcome};
use super::target::SubscriptionTarget;
use crate::config::MonitorConfig;
use crate::observability::metrics;
use crate::progress::{
    Clock, DeploymentSnapshot, EventRule, EventScopeFilter, ObservedEvent, ProgressUpdate, SystemClock,
};
use crate::runtime::error_policy::log_watch_error;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Outcome of a successful `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// A new subscription started streaming
    Started,
    /// The target already had an active subscription; nothing was set up
    AlreadyActive,
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Terminal,
    Cancelled,
    TimedOut,
    WatchClosed,
    WatchFailed,
}

impl ExitReason {
    fn as_str(self) -> &'static str {
        match self {
            ExitReason::Terminal => "terminal",
            ExitReason::Cancelled => "cancelled",
            ExitReason::TimedOut => "timeout",
            ExitReason::WatchClosed => "watch_closed",
            ExitReason::WatchFailed => "watch_failed",
        }
    }
}

#[derive(Debug)]
struct RegistryEntry {
    id: u64,
    cancel: watch::Sender<bool>,
    done: watch::Receiver<bool>,
    /// Flips to true once setup published the initial update; the sender is
    /// dropped without flipping when setup fails
    started: watch::Receiver<bool>,
}

type Registry = Arc<Mutex<HashMap<SubscriptionTarget, RegistryEntry>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<SubscriptionTarget, RegistryEntry>> {
    // A poisoned registry still holds consistent membership data
    registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn remove_entry(registry: &Registry, target: &SubscriptionTarget, id: u64) {
    let mut entries = lock_registry(registry);
    if entries.get(target).is_some_and(|entry| entry.id == id) {
        entries.remove(target);
    }
}

/// Streams progress updates for ClusterDeployment resources
pub struct SubscriptionManager {
    resources: Arc<dyn ResourceWatcher>,
    events: Arc<dyn EventsProvider>,
    sink: RwLock<Option<Arc<dyn ProgressSink>>>,
    clock: Arc<dyn Clock>,
    limiter: Arc<CapacityLimiter>,
    namespaces: NamespaceFilter,
    rules: Vec<EventRule>,
    config: MonitorConfig,
    registry: Registry,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("config", &self.config)
            .field("active", &self.active_subscriptions().len())
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Build a manager with limits taken from `config` and the system clock
    ///
    /// # Errors
    ///
    /// Fails when an `allowed_namespaces` pattern is not a valid regex.
    pub fn new(
        resources: Arc<dyn ResourceWatcher>,
        events: Arc<dyn EventsProvider>,
        config: MonitorConfig,
    ) -> Result<Self, regex::Error> {
        let namespaces = NamespaceFilter::new(&config.allowed_namespaces)?;
        let limiter = Arc::new(CapacityLimiter::new(config.per_caller_limit, config.global_limit));
        Ok(Self {
            resources,
            events,
            sink: RwLock::new(None),
            clock: Arc::new(SystemClock),
            limiter,
            namespaces,
            rules: EventRule::defaults(),
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<CapacityLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_rules(mut self, rules: Vec<EventRule>) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_namespace_filter(mut self, namespaces: NamespaceFilter) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Attach the sink updates are published to
    ///
    /// Subscriptions started earlier keep the sink they started with.
    pub fn bind(&self, sink: Arc<dyn ProgressSink>) {
        match self.sink.write() {
            Ok(mut guard) => *guard = Some(sink),
            Err(poisoned) => *poisoned.into_inner() = Some(sink),
        }
    }

    fn bound_sink(&self) -> Option<Arc<dyn ProgressSink>> {
        match self.sink.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn limiter(&self) -> &Arc<CapacityLimiter> {
        &self.limiter
    }

    /// Targets with a registered subscription, sorted
    pub fn active_subscriptions(&self) -> Vec<SubscriptionTarget> {
        let mut targets: Vec<_> = lock_registry(&self.registry).keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn is_subscribed(&self, target: &SubscriptionTarget) -> bool {
        lock_registry(&self.registry).contains_key(target)
    }

    fn pending_start(&self, target: &SubscriptionTarget) -> Option<watch::Receiver<bool>> {
        lock_registry(&self.registry)
            .get(target)
            .map(|entry| entry.started.clone())
    }

    /// Start streaming progress for `target`
    ///
    /// Idempotent per target: a second call while the first subscription is
    /// registered returns [`SubscribeOutcome::AlreadyActive`] without touching
    /// quotas or watches. A call that overlaps another call's setup waits for
    /// it, and sets the subscription up itself if that setup fails. Returns
    /// once the initial update has been published.
    ///
    /// # Errors
    ///
    /// Validation, authorization, binding, quota, not-found and watch-setup
    /// failures. No registry entry or capacity slot survives an error.
    pub async fn subscribe(
        &self,
        caller: &str,
        target: &SubscriptionTarget,
        timeout: Option<Duration>,
    ) -> MonitorResult<SubscribeOutcome> {
        let result = self.try_subscribe(caller, target, timeout).await;
        if let Err(e) = &result {
            metrics::increment_subscriptions_rejected(e.as_str());
            warn!(
                resource.namespace = %target.namespace,
                resource.name = %target.name,
                caller,
                reason = e.as_str(),
                "Subscription rejected: {}",
                e
            );
        }
        result
    }

    async fn try_subscribe(
        &self,
        caller: &str,
        target: &SubscriptionTarget,
        timeout: Option<Duration>,
    ) -> MonitorResult<SubscribeOutcome> {
        target.validate()?;
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(MonitorError::InvalidTimeout("0".to_string()));
        }
        self.namespaces.authorize(&target.namespace)?;
        let sink = self.bound_sink().ok_or(MonitorError::NotBound)?;

        let (slot, id, cancel_rx, done_tx, started_tx) = loop {
            if let Some(started) = self.pending_start(target) {
                if wait_started(started).await {
                    debug!(
                        resource.namespace = %target.namespace,
                        resource.name = %target.name,
                        caller,
                        "Subscription already active"
                    );
                    return Ok(SubscribeOutcome::AlreadyActive);
                }
                // The in-flight setup failed and left the registry; try ourselves
                continue;
            }

            let slot = self.limiter.try_acquire(caller)?;
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let (done_tx, done_rx) = watch::channel(false);
            let (started_tx, started_rx) = watch::channel(false);
            let inserted = {
                let mut entries = lock_registry(&self.registry);
                if entries.contains_key(target) {
                    false
                } else {
                    entries.insert(
                        target.clone(),
                        RegistryEntry {
                            id,
                            cancel: cancel_tx,
                            done: done_rx,
                            started: started_rx,
                        },
                    );
                    true
                }
            };
            // Losing a race releases the slot and waits on the winner instead
            if inserted {
                break (slot, id, cancel_rx, done_tx, started_tx);
            }
        };
        let mut teardown = Teardown {
            registry: Arc::clone(&self.registry),
            target: target.clone(),
            id,
            slot: Some(slot),
            done: done_tx,
            started: started_tx,
            opened: false,
            reason: None,
        };

        // Resource first: a missing target must not cost an event watch
        let resource = self
            .resources
            .get(&target.namespace, &target.name)
            .await?
            .ok_or_else(|| MonitorError::NotFound {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
            })?;
        let resource_stream = self.resources.watch(&target.namespace, &target.name).await?;
        let event_stream = self.open_event_stream(target).await;
        let seed = self.list_events(target).await;

        let mut subscription = Subscription::new(
            target.clone(),
            caller,
            self.scope_filter(target),
            SubscriptionTiming {
                timeout: timeout.unwrap_or(self.config.default_timeout),
                warning_lead: self.config.timeout_warning,
                stall_threshold: self.config.stall_threshold,
            },
        );

        let newest_match = subscription.seed_events(seed, self.config.event_snapshot_limit);
        let initial = subscription.apply_resource(&ResourceDelta {
            resource,
            change: ChangeKind::Added,
        });

        let initial_phase = initial.phase;
        let mut finished = deliver(&mut subscription, sink.as_ref(), initial);
        if !finished {
            // Seeded evidence only speaks up when it moves the phase
            let replayed = newest_match
                .and_then(|event| subscription.replay_event(&event))
                .filter(|update| update.phase != initial_phase);
            if let Some(update) = replayed {
                finished = deliver(&mut subscription, sink.as_ref(), update);
            }
        }

        metrics::subscription_opened();
        teardown.opened = true;
        teardown.started.send_replace(true);
        info!(
            resource.namespace = %target.namespace,
            resource.name = %target.name,
            caller,
            phase = %subscription.phase(),
            timeout_secs = subscription.timeout().as_secs(),
            "Subscription started"
        );

        let worker = Worker {
            subscription,
            resources: resource_stream,
            events: event_stream,
            cancel: cancel_rx,
            sink,
            tick_interval: self.config.tick_interval,
        };
        let span = info_span!(
            "subscription",
            resource.namespace = %target.namespace,
            resource.name = %target.name,
            caller
        );
        tokio::spawn(
            async move {
                let reason = if finished {
                    ExitReason::Terminal
                } else {
                    worker.run().await
                };
                teardown.finish(reason);
            }
            .instrument(span),
        );

        Ok(SubscribeOutcome::Started)
    }

    fn scope_filter(&self, target: &SubscriptionTarget) -> EventScopeFilter {
        EventScopeFilter::new(&target.name, &target.namespace, Arc::clone(&self.clock))
            .with_rules(self.rules.clone())
            .with_retention(
                self.config.event_retention_count,
                chrono::Duration::from_std(self.config.event_retention)
                    .unwrap_or(chrono::Duration::MAX),
            )
    }

    /// Open the namespace event watch; event context is optional
    async fn open_event_stream(&self, target: &SubscriptionTarget) -> Option<EventStream> {
        match self.events.watch_namespace(&target.namespace).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(
                    resource.namespace = %target.namespace,
                    resource.name = %target.name,
                    "Event watch unavailable, streaming conditions only: {}",
                    e
                );
                None
            }
        }
    }

    async fn list_events(&self, target: &SubscriptionTarget) -> Vec<ObservedEvent> {
        match self.events.list(&target.namespace).await {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    resource.namespace = %target.namespace,
                    resource.name = %target.name,
                    "Failed to list recent events: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    /// Stop streaming `target` and wait until its worker has torn down
    ///
    /// No-op when the target is not subscribed.
    pub async fn unsubscribe(&self, target: &SubscriptionTarget) {
        let done = {
            let entries = lock_registry(&self.registry);
            let Some(entry) = entries.get(target) else {
                debug!(
                    resource.namespace = %target.namespace,
                    resource.name = %target.name,
                    "Unsubscribe for inactive target"
                );
                return;
            };
            entry.cancel.send_replace(true);
            entry.done.clone()
        };
        wait_done(done).await;
        info!(
            resource.namespace = %target.namespace,
            resource.name = %target.name,
            "Unsubscribed"
        );
    }

    /// Cancel every subscription and wait for all of them to tear down
    pub async fn shutdown(&self) {
        let pending: Vec<watch::Receiver<bool>> = {
            let entries = lock_registry(&self.registry);
            entries
                .values()
                .map(|entry| {
                    entry.cancel.send_replace(true);
                    entry.done.clone()
                })
                .collect()
        };
        futures::future::join_all(pending.into_iter().map(wait_done)).await;
    }

    /// One-shot classification of the target with no event context
    ///
    /// # Errors
    ///
    /// Validation, authorization, not-found and API failures.
    pub async fn get_state(&self, target: &SubscriptionTarget) -> MonitorResult<ProgressUpdate> {
        target.validate()?;
        self.namespaces.authorize(&target.namespace)?;
        let resource = self
            .resources
            .get(&target.namespace, &target.name)
            .await?
            .ok_or_else(|| MonitorError::NotFound {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
            })?;
        let snapshot = DeploymentSnapshot::from_resource(&resource);
        Ok(condition_update(&snapshot, &[], self.clock.now()))
    }
}

/// Whether an in-flight setup got as far as streaming
async fn wait_started(mut started: watch::Receiver<bool>) -> bool {
    started.wait_for(|started| *started).await.is_ok()
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // Err means the sender is gone, which only happens after teardown
    let _ = done.wait_for(|finished| *finished).await;
}

/// Publish unless coalesced; returns whether the update ends the stream
fn deliver(subscription: &mut Subscription, sink: &dyn ProgressSink, update: ProgressUpdate) -> bool {
    let terminal = update.terminal;
    if !subscription.should_publish(&update) {
        metrics::increment_updates_coalesced();
        debug!(phase = %update.phase, reason = %update.reason, "Coalesced duplicate update");
        return terminal;
    }
    subscription.record_published(&update);
    let phase = update.phase;
    match sink.publish(subscription.target(), update) {
        Ok(()) => metrics::increment_updates_published(phase.as_str()),
        Err(e) => {
            metrics::increment_publish_failures();
            warn!(phase = %phase, "Dropped progress update: {}", e);
        }
    }
    terminal
}

/// Everything a worker owns while streaming
struct Worker {
    subscription: Subscription,
    resources: ResourceStream,
    events: Option<EventStream>,
    cancel: watch::Receiver<bool>,
    sink: Arc<dyn ProgressSink>,
    tick_interval: Duration,
}

async fn next_event(events: Option<&mut EventStream>) -> Option<Result<ObservedEvent, WatchError>> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self) -> ExitReason {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                changed = self.cancel.changed() => {
                    if changed.is_err() || *self.cancel.borrow() {
                        return ExitReason::Cancelled;
                    }
                }

                delta = self.resources.next() => {
                    let Some(delta) = delta else {
                        warn!("Resource watch closed");
                        let update = self.subscription.watch_closed();
                        self.publish(update);
                        return ExitReason::WatchClosed;
                    };
                    match delta {
                        Ok(delta) => {
                            let update = self.subscription.apply_resource(&delta);
                            if self.publish(update) {
                                return ExitReason::Terminal;
                            }
                        }
                        Err(e) => {
                            if let Some(reason) = self.on_resource_error(&e) {
                                return reason;
                            }
                        }
                    }
                }

                event = next_event(self.events.as_mut()), if self.events.is_some() => {
                    match event {
                        Some(Ok(event)) => {
                            if let Some(update) = self.subscription.apply_event(event) {
                                if self.publish(update) {
                                    return ExitReason::Terminal;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            let target = self.subscription.target();
                            let kind = log_watch_error("events", &target.namespace, &target.name, &e.to_string());
                            metrics::increment_watch_errors("events", kind.as_str());
                            let update = self.subscription.event_stream_warning(&e.to_string());
                            self.publish(update);
                        }
                        None => {
                            warn!("Event watch closed, continuing with conditions only");
                            self.events = None;
                        }
                    }
                }

                _ = ticker.tick() => {
                    match self.subscription.tick() {
                        TickOutcome::Continue => {}
                        TickOutcome::Warning(update) => {
                            info!(deadline = %self.subscription.deadline(), "Monitoring window ending soon");
                            self.publish(update);
                        }
                        TickOutcome::Expired(update) => {
                            info!("Monitoring window elapsed");
                            self.publish(update);
                            return ExitReason::TimedOut;
                        }
                    }
                }
            }
        }
    }

    fn publish(&mut self, update: ProgressUpdate) -> bool {
        deliver(&mut self.subscription, self.sink.as_ref(), update)
    }

    /// Handle a resource watch error; `Some` ends the subscription
    fn on_resource_error(&mut self, error: &WatchError) -> Option<ExitReason> {
        let target = self.subscription.target();
        let message = error.to_string();
        let kind = log_watch_error("resource", &target.namespace, &target.name, &message);
        metrics::increment_watch_errors("resource", kind.as_str());
        if error.is_transient() {
            return None;
        }
        error!("Resource watch failed, ending subscription");
        let update = self.subscription.watch_failed(&message);
        self.publish(update);
        Some(ExitReason::WatchFailed)
    }
}

/// Releases what a subscription held: slot, registry entry, then completion
///
/// Armed as soon as the registry key is reserved, so setup failures and worker
/// panics release everything the same way a normal exit does.
struct Teardown {
    registry: Registry,
    target: SubscriptionTarget,
    id: u64,
    slot: Option<CapacitySlot>,
    done: watch::Sender<bool>,
    started: watch::Sender<bool>,
    opened: bool,
    reason: Option<ExitReason>,
}

impl Teardown {
    fn finish(mut self, reason: ExitReason) {
        self.reason = Some(reason);
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        drop(self.slot.take());
        remove_entry(&self.registry, &self.target, self.id);
        if self.opened {
            let reason = self.reason.map_or("aborted", ExitReason::as_str);
            metrics::subscription_closed(reason);
            info!(reason, "Subscription closed");
        }
        self.done.send_replace(true);
    }
}
