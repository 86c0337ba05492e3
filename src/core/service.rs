//! # ContentService: the façade over providers, lifecycle and aggregation.
//!
//! The [`ContentService`] owns the [`LifecycleManager`], the [`ProviderRegistry`]
//! it feeds, the content [`ListenerSet`], the event [`Bus`] with its
//! [`SubscriberSet`], and the [`SharedExecutor`] every provider call runs on.
//!
//! ## High-level architecture
//! ```text
//! add_content_provider(p)
//!   ├─ before init: pending list
//!   └─ after init:  LifecycleManager::add_provider(p, ctx, adv.assigned_id())
//!                         └─► ProviderActor ── state_changed ──► ProviderRegistry
//!
//! init()  ─► drain pending (once, under the state lock) ─► add_provider each ─► manager.init()
//! start() ─► manager.start()        stop() ─► manager.stop()
//!
//! retrieve_content(target)        ─► TransferAggregator (registry snapshot) ─► TransferHandle
//! share_content / unshare_content ─► executor task per provider (share_timeout) ─► ListenerSet::notify
//! find_content_shares(max, l)     ─► EventAggregator (snapshot, {l}) ─► FindHandle
//!
//! Diagnostics:
//!   everything ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet::emit
//! ```
//!
//! ## Rules
//! - The state lock guards only the initialized/started flags, the pending list and
//!   the init parameters; it is never held while provider or listener code runs
//! - Only [`ServiceError`]s cross this boundary; provider and listener faults are logged
//!   and degrade the result
//! - `init`, `start` and `stop` are idempotent
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use contentvisor::{
//!     Advertisement, Content, ContentProvider, ContentService, ContentShare, ManagedProvider,
//!     ModuleId, ModuleImplAdvertisement, Operation, PeerGroupContext, ProviderError,
//!     ServiceConfig, ShareAdvertisement,
//! };
//!
//! struct Announce;
//!
//! #[async_trait]
//! impl ContentProvider for Announce {
//!     fn name(&self) -> &str { "announce" }
//!     fn supports(&self, op: Operation) -> bool { op == Operation::Share }
//!     async fn share(&self, content: &Content) -> Result<Vec<ContentShare>, ProviderError> {
//!         Ok(vec![ContentShare::new(ShareAdvertisement::new(content.id().clone()), "announce")])
//!     }
//!     fn as_managed(self: Arc<Self>) -> Option<Arc<dyn ManagedProvider>> { Some(self) }
//! }
//!
//! #[async_trait]
//! impl ManagedProvider for Announce {
//!     fn advertisement(&self) -> Advertisement { Advertisement::Other { id: "announce".into() } }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let service = ContentService::builder(ServiceConfig::default())
//!         .with_providers(vec![Arc::new(Announce)])
//!         .build();
//!
//!     service.init(
//!         PeerGroupContext::new("net", "urn:group", "urn:peer"),
//!         ModuleId::new("content"),
//!         ModuleImplAdvertisement::default(),
//!     );
//!     service.start();
//!
//!     // providers start asynchronously
//!     while service.content_providers().is_empty() {
//!         tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//!     }
//!     let shares = service.share_content(&Content::new("doc", "hello")).await;
//!     assert_eq!(shares.map(|s| s.len()), Some(1));
//!
//!     service.shutdown().await;
//! }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

use crate::{
    aggregate::{EventAggregator, FindHandle, TransferAggregator, TransferHandle},
    content::{
        Content, ContentId, ContentShare, ModuleId, ModuleImplAdvertisement, PeerGroupContext,
        RetrieveTarget,
    },
    core::{
        builder::ContentServiceBuilder,
        config::ServiceConfig,
        lifecycle::{LifecycleListener, LifecycleManager, ProviderRecord},
        registry::ProviderRegistry,
        state::LifecycleState,
    },
    error::{ProviderError, ServiceError, panic_message},
    events::{Bus, Event, EventKind},
    listeners::{ContentEvent, ContentListener, ListenerSet},
    monitor::SharedExecutor,
    provider::{ContentProvider, ManagedProvider, Operation, ProviderContext, provider_key},
    subscribers::SubscriberSet,
};

/// Result of [`ContentService::start`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartStatus {
    /// Start accepted; providers may still be transitioning.
    Ok,
}

/// Flags and init parameters guarded by the state lock.
struct ServiceState {
    initialized: bool,
    started: bool,
    /// Providers added before `init`; `None` once drained.
    pending: Option<Vec<Arc<dyn ManagedProvider>>>,
    group: PeerGroupContext,
    assigned_id: Option<ModuleId>,
    impl_adv: Option<ModuleImplAdvertisement>,
}

/// Entry point for retrieving, sharing and discovering content.
pub struct ContentService {
    cfg: ServiceConfig,
    state: Mutex<ServiceState>,
    manager: LifecycleManager,
    registry: Arc<ProviderRegistry>,
    listeners: ListenerSet,
    transfers: TransferAggregator,
    exec: SharedExecutor,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl ContentService {
    /// Returns a builder for a service with `cfg`.
    pub fn builder(cfg: ServiceConfig) -> ContentServiceBuilder {
        ContentServiceBuilder::new(cfg)
    }

    /// Wires all components. Must be called inside a tokio runtime.
    pub(crate) fn new_internal(
        cfg: ServiceConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        pending: Vec<Arc<dyn ManagedProvider>>,
    ) -> Arc<Self> {
        let exec = SharedExecutor::new(cfg.monitor).with_bus(bus.clone());
        let registry = Arc::new(ProviderRegistry::new());
        let manager = LifecycleManager::new(
            exec.clone(),
            bus.clone(),
            cfg.lifecycle_timeout(),
            vec![Arc::clone(&registry) as Arc<dyn LifecycleListener>],
        );
        let transfers =
            TransferAggregator::new(exec.clone(), cfg.transfer_timeout()).with_bus(bus.clone());

        let mut queued: Vec<Arc<dyn ManagedProvider>> = Vec::with_capacity(pending.len());
        for p in pending {
            push_unique(&mut queued, p);
        }

        let service = Arc::new(Self {
            state: Mutex::new(ServiceState {
                initialized: false,
                started: false,
                pending: Some(queued),
                group: PeerGroupContext::default(),
                assigned_id: None,
                impl_adv: None,
            }),
            manager,
            registry,
            listeners: ListenerSet::new().with_bus(bus.clone()),
            transfers,
            exec,
            bus,
            subs,
            forwarder: Mutex::new(None),
            cfg,
        });
        service.subscriber_listener();
        service
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.forwarder.lock() = Some(handle);
    }

    // ---------------------------
    // Module lifecycle
    // ---------------------------

    /// Initializes the service. Only the first call has any effect.
    ///
    /// Drains the pending-registration list atomically with the initialized flag
    /// and registers each drained provider with the lifecycle manager.
    pub fn init(
        &self,
        group: PeerGroupContext,
        assigned_id: ModuleId,
        impl_adv: ModuleImplAdvertisement,
    ) {
        let to_add = {
            let mut st = self.state.lock();
            if st.initialized {
                return;
            }
            st.initialized = true;
            st.group = group.clone();
            st.assigned_id = Some(assigned_id.clone());
            st.impl_adv = Some(impl_adv.clone());
            st.pending.take().unwrap_or_default()
        };

        let pending: Vec<&str> = to_add.iter().map(|p| p.name()).collect();
        tracing::info!(
            service = %assigned_id,
            spec_id = ?impl_adv.spec_id,
            description = ?impl_adv.description,
            uri = ?impl_adv.uri,
            code = ?impl_adv.code,
            group = %group.group_name,
            group_id = %group.group_id,
            peer_id = %group.peer_id,
            providers = ?pending,
            "configuring content service"
        );

        let count = to_add.len();
        for provider in to_add {
            self.register(provider, &group);
        }
        self.manager.init();
        self.bus
            .publish(Event::new(EventKind::ServiceInitialized).with_count(count));
    }

    /// Starts every registered provider. Returns [`StartStatus::Ok`] without
    /// waiting for providers to reach `Started`.
    pub fn start(&self) -> StartStatus {
        {
            let mut st = self.state.lock();
            if st.started {
                return StartStatus::Ok;
            }
            st.started = true;
        }
        self.manager.start();
        tracing::debug!("content service started");
        self.bus.publish(Event::new(EventKind::ServiceStarted));
        StartStatus::Ok
    }

    /// Stops every started provider. No-op unless started.
    pub fn stop(&self) {
        {
            let mut st = self.state.lock();
            if !st.started {
                return;
            }
            st.started = false;
        }
        self.manager.stop();
        tracing::debug!("content service stopped");
        self.bus.publish(Event::new(EventKind::ServiceStopped));
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// The implementation advertisement given to [`init`](Self::init).
    pub fn impl_advertisement(&self) -> Result<ModuleImplAdvertisement, ServiceError> {
        self.state
            .lock()
            .impl_adv
            .clone()
            .ok_or(ServiceError::NotInitialized)
    }

    // ---------------------------
    // Providers
    // ---------------------------

    /// Adds a provider.
    ///
    /// Before `init` it is queued; afterwards it is registered with the lifecycle
    /// manager under its advertisement's assigned identity and driven to the
    /// service's current phase.
    pub fn add_content_provider(&self, provider: Arc<dyn ManagedProvider>) {
        let group = {
            let mut st = self.state.lock();
            if !st.initialized {
                if let Some(pending) = st.pending.as_mut() {
                    push_unique(pending, provider);
                }
                return;
            }
            st.group.clone()
        };
        self.register(provider, &group);
    }

    /// Removes a provider previously added.
    ///
    /// Providers that do not expose the managed surface are ignored. A removal
    /// after `init` stops the provider and interrupts a stop already in progress.
    /// Returns whether anything was removed.
    pub fn remove_content_provider(&self, provider: &Arc<dyn ContentProvider>) -> bool {
        let Some(managed) = Arc::clone(provider).as_managed() else {
            tracing::trace!(provider = provider.name(), "not a managed provider; removal ignored");
            return false;
        };
        {
            let mut st = self.state.lock();
            if !st.initialized {
                let key = provider_key(&managed);
                return match st.pending.as_mut() {
                    Some(pending) => {
                        let before = pending.len();
                        pending.retain(|p| provider_key(p) != key);
                        pending.len() != before
                    }
                    None => false,
                };
            }
        }
        self.manager.remove_provider(&managed, true)
    }

    /// Point-in-time copy of the started providers.
    pub fn content_providers(&self) -> Vec<Arc<dyn ContentProvider>> {
        self.registry
            .snapshot()
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn ContentProvider>)
            .collect()
    }

    /// Lifecycle state of a provider registered with the manager.
    pub fn provider_state(&self, provider: &Arc<dyn ManagedProvider>) -> Option<LifecycleState> {
        self.manager.state_of(provider)
    }

    /// Registration records, in registration order.
    pub fn provider_records(&self) -> Vec<ProviderRecord> {
        self.manager.records()
    }

    fn register(&self, provider: Arc<dyn ManagedProvider>, group: &PeerGroupContext) {
        let advertisement = provider.advertisement();
        let assigned_id = advertisement.assigned_id();
        let ctx = ProviderContext {
            group: group.clone(),
            assigned_id: assigned_id.clone(),
            advertisement,
        };
        self.manager.add_provider(provider, ctx, assigned_id);
    }

    // ---------------------------
    // Content operations
    // ---------------------------

    /// Starts retrieving content from every started provider.
    ///
    /// Returns `None` when no transfer can be constructed (no capable provider,
    /// or every provider rejected the request).
    pub fn retrieve_content(&self, target: impl Into<RetrieveTarget>) -> Option<TransferHandle> {
        let target = target.into();
        match self.transfers.retrieve(&target, &self.registry.snapshot()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::debug!(
                    content = %target.content_id(),
                    error = %e,
                    label = e.as_label(),
                    "no transfer for content"
                );
                None
            }
        }
    }

    /// Shares `content` through every started provider that supports sharing.
    ///
    /// Each provider call runs on the executor, bounded by `share_timeout`.
    /// Listeners are notified once with all shares before they are returned.
    /// Returns `None` if no provider produced a share.
    pub async fn share_content(&self, content: &Content) -> Option<Vec<ContentShare>> {
        let owned = content.clone();
        let results = self
            .fan_out(Operation::Share, "share", move |p| {
                let content = owned.clone();
                async move { p.share(&content).await }
            })
            .await;

        let mut shares = Vec::new();
        for (provider, res) in results {
            match res {
                Ok(produced) => {
                    tracing::debug!(
                        provider = provider.name(),
                        content = %content.id(),
                        shares = produced.len(),
                        "content shared by provider"
                    );
                    shares.extend(produced);
                }
                Err(e) if e.is_unsupported() => {
                    tracing::trace!(provider = provider.name(), "share unsupported; skipped");
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        content = %content.id(),
                        error = %e,
                        label = e.as_label(),
                        "share failed"
                    );
                }
            }
        }

        if shares.is_empty() {
            return None;
        }
        self.bus.publish(
            Event::new(EventKind::ContentShared)
                .with_content(content.id().clone())
                .with_count(shares.len()),
        );
        self.listeners
            .notify(&ContentEvent::Shared {
                shares: shares.clone(),
            })
            .await;
        Some(shares)
    }

    /// Unshares `id` on every started provider that supports unsharing.
    ///
    /// Returns `true` if any provider reported success; listeners are then
    /// notified once. A failing or timed out provider counts as `false`.
    pub async fn unshare_content(&self, id: &ContentId) -> bool {
        let owned = id.clone();
        let results = self
            .fan_out(Operation::Unshare, "unshare", move |p| {
                let id = owned.clone();
                async move { p.unshare(&id).await }
            })
            .await;

        let mut unshared = false;
        for (provider, res) in results {
            match res {
                Ok(done) => unshared |= done,
                Err(e) if e.is_unsupported() => {
                    tracing::trace!(provider = provider.name(), "unshare unsupported; skipped");
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        content = %id,
                        error = %e,
                        label = e.as_label(),
                        "unshare failed"
                    );
                }
            }
        }

        if unshared {
            self.bus
                .publish(Event::new(EventKind::ContentUnshared).with_content(id.clone()));
            self.listeners
                .notify(&ContentEvent::Unshared { id: id.clone() })
                .await;
        }
        unshared
    }

    /// Runs `call` for every capable provider of the current snapshot on the
    /// executor, concurrently. Results come back in snapshot order.
    async fn fan_out<T, F, Fut>(
        &self,
        op: Operation,
        label: &'static str,
        call: F,
    ) -> Vec<(Arc<dyn ManagedProvider>, Result<T, ProviderError>)>
    where
        F: Fn(Arc<dyn ManagedProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
        T: Send + 'static,
    {
        let snapshot = self.registry.snapshot();
        let timeout = self.cfg.share_timeout();
        let calls = snapshot
            .iter()
            .filter(|p| capable(p, op))
            .map(|p| {
                let work = AssertUnwindSafe(call(Arc::clone(p)))
                    .catch_unwind()
                    .map(|res| {
                        res.unwrap_or_else(|payload| {
                            Err(ProviderError::Panicked {
                                info: panic_message(payload.as_ref()),
                            })
                        })
                    });
                let join = self.exec.spawn(format!("{label}:{}", p.name()), work);
                let provider = Arc::clone(p);
                async move { (provider, settle(join, timeout).await) }
            });
        join_all(calls).await
    }

    /// Finds up to `max` shares across started providers, reporting them to `listener`.
    pub fn find_content_shares(
        &self,
        max: usize,
        listener: Arc<dyn ContentListener>,
    ) -> Result<FindHandle, ServiceError> {
        if max == 0 {
            return Err(ServiceError::InvalidArgument {
                reason: "max must be greater than zero".to_string(),
            });
        }
        let listeners = Arc::new(ListenerSet::single(listener).with_bus(self.bus.clone()));
        let aggregator = EventAggregator::new(
            listeners,
            self.registry.snapshot(),
            self.exec.clone(),
            self.cfg.find_timeout(),
        )
        .with_bus(self.bus.clone());
        Ok(aggregator.dispatch_find(max))
    }

    // ---------------------------
    // Listeners and diagnostics
    // ---------------------------

    /// Registers a share/unshare listener. Returns `false` if already registered.
    pub fn add_listener(&self, listener: Arc<dyn ContentListener>) -> bool {
        self.listeners.add(listener)
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn ContentListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.cfg
    }

    /// Event bus carrying runtime diagnostics.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The monitored pool used for every provider call.
    pub fn executor(&self) -> &SharedExecutor {
        &self.exec
    }

    /// Stops and unregisters every provider, then drains the subscriber workers.
    pub async fn shutdown(&self) {
        {
            let mut st = self.state.lock();
            st.started = false;
        }
        self.manager.shutdown().await;
        self.bus.publish(Event::new(EventKind::ServiceStopped));

        let forwarder = self.forwarder.lock().take();
        if let Some(handle) = forwarder {
            // let the forwarder pick up what is already on the bus
            tokio::task::yield_now().await;
            handle.abort();
        }
        self.subs.shutdown().await;
    }
}

/// Waits for a spawned provider call; on timeout the call is aborted.
async fn settle<T>(
    mut join: JoinHandle<Result<T, ProviderError>>,
    timeout: Option<Duration>,
) -> Result<T, ProviderError> {
    let joined = match timeout {
        Some(dur) => match time::timeout(dur, &mut join).await {
            Ok(joined) => joined,
            Err(_elapsed) => {
                join.abort();
                return Err(ProviderError::Timeout { timeout: dur });
            }
        },
        None => join.await,
    };
    joined.unwrap_or_else(|e| {
        if e.is_panic() {
            Err(ProviderError::Panicked {
                info: panic_message(e.into_panic().as_ref()),
            })
        } else {
            Err(ProviderError::Canceled)
        }
    })
}

fn capable(provider: &Arc<dyn ManagedProvider>, op: Operation) -> bool {
    let ok = provider.supports(op);
    if !ok {
        tracing::trace!(provider = provider.name(), ?op, "operation unsupported; skipped");
    }
    ok
}

fn push_unique(list: &mut Vec<Arc<dyn ManagedProvider>>, provider: Arc<dyn ManagedProvider>) {
    let key = provider_key(&provider);
    if !list.iter().any(|p| provider_key(p) == key) {
        list.push(provider);
    }
}

impl std::fmt::Debug for ContentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ContentService")
            .field("initialized", &st.initialized)
            .field("started", &st.started)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
