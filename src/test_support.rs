//! Shared fixtures for unit tests: a scriptable in-memory provider and recording observers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    content::{
        Advertisement, Content, ContentId, ContentShare, ModuleId, PeerGroupContext,
        RetrieveTarget, ShareAdvertisement,
    },
    core::{LifecycleListener, LifecycleState},
    error::ProviderError,
    listeners::{ContentEvent, ContentListener, ListenerSet},
    provider::{
        BoxTransferFuture, ContentProvider, ManagedProvider, Operation, ProviderContext,
        ShareStream,
    },
};

/// How a lifecycle phase behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PhaseBehavior {
    Ok,
    Fail,
    Panic,
    /// Never completes.
    Hang,
    /// Completes successfully after the delay.
    Slow(Duration),
}

/// How `retrieve` behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetrieveBehavior {
    /// Serves stored content; rejects unknown ids.
    Serve,
    Reject,
    /// Accepts, then fails.
    Fail,
    /// Accepts, then panics.
    Panic,
    /// Accepts and never completes; dropping the transfer counts as a cancellation.
    Hang,
}

/// How `find_shares` behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FindBehavior {
    /// One batch per entry, with that many shares each.
    Batches(Vec<usize>),
    /// One share every millisecond until dropped.
    Endless,
    /// Never yields and never ends.
    Silent,
}

/// Increments a counter when dropped.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scriptable in-memory provider.
pub(crate) struct MemoryProvider {
    name: String,
    init: PhaseBehavior,
    start: PhaseBehavior,
    stop: PhaseBehavior,
    retrieve: RetrieveBehavior,
    find: FindBehavior,
    unsupported: Vec<Operation>,
    share: PhaseBehavior,
    unshare: PhaseBehavior,
    store: Mutex<HashMap<ContentId, Content>>,
    init_calls: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    cancelled_retrievals: Arc<AtomicUsize>,
    cancelled_finds: Arc<AtomicUsize>,
}

impl MemoryProvider {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init: PhaseBehavior::Ok,
            start: PhaseBehavior::Ok,
            stop: PhaseBehavior::Ok,
            retrieve: RetrieveBehavior::Serve,
            find: FindBehavior::Batches(Vec::new()),
            unsupported: Vec::new(),
            share: PhaseBehavior::Ok,
            unshare: PhaseBehavior::Ok,
            store: Mutex::new(HashMap::new()),
            init_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            cancelled_retrievals: Arc::new(AtomicUsize::new(0)),
            cancelled_finds: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Well-behaved provider supporting every operation.
    pub(crate) fn arc(name: impl Into<String>) -> Arc<Self> {
        Self::new(name).into_arc()
    }

    pub(crate) fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn with_init(mut self, b: PhaseBehavior) -> Self {
        self.init = b;
        self
    }

    pub(crate) fn with_start(mut self, b: PhaseBehavior) -> Self {
        self.start = b;
        self
    }

    pub(crate) fn with_stop(mut self, b: PhaseBehavior) -> Self {
        self.stop = b;
        self
    }

    pub(crate) fn with_retrieve(mut self, b: RetrieveBehavior) -> Self {
        self.retrieve = b;
        self
    }

    pub(crate) fn with_find(mut self, b: FindBehavior) -> Self {
        self.find = b;
        self
    }

    pub(crate) fn with_share(mut self, b: PhaseBehavior) -> Self {
        self.share = b;
        self
    }

    pub(crate) fn with_unshare(mut self, b: PhaseBehavior) -> Self {
        self.unshare = b;
        self
    }

    pub(crate) fn without(mut self, op: Operation) -> Self {
        self.unsupported.push(op);
        self
    }

    pub(crate) fn insert(&self, content: Content) {
        self.store.lock().insert(content.id().clone(), content);
    }

    pub(crate) fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled_retrievals(&self) -> usize {
        self.cancelled_retrievals.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled_finds(&self) -> usize {
        self.cancelled_finds.load(Ordering::SeqCst)
    }

    fn share_for(&self, id: ContentId) -> ContentShare {
        ContentShare::new(
            ShareAdvertisement::new(id).with_name(self.name.as_str()),
            self.name.as_str(),
        )
    }
}

async fn explode() -> Result<Content, ProviderError> {
    panic!("transfer panicked")
}

async fn run_phase(behavior: PhaseBehavior, phase: &str) -> Result<(), ProviderError> {
    match behavior {
        PhaseBehavior::Ok => Ok(()),
        PhaseBehavior::Fail => Err(ProviderError::failed(format!("{phase} failed"))),
        PhaseBehavior::Panic => panic!("{phase} panicked"),
        PhaseBehavior::Hang => {
            std::future::pending::<()>().await;
            Ok(())
        }
        PhaseBehavior::Slow(delay) => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

#[async_trait]
impl ContentProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, op: Operation) -> bool {
        !self.unsupported.contains(&op)
    }

    fn retrieve(
        &self,
        target: &RetrieveTarget,
        _ctx: CancellationToken,
    ) -> Result<BoxTransferFuture, ProviderError> {
        if !self.supports(Operation::Retrieve) {
            return Err(ProviderError::Unsupported {
                op: Operation::Retrieve,
            });
        }
        match self.retrieve {
            RetrieveBehavior::Serve => {
                let found = self.store.lock().get(target.content_id()).cloned();
                match found {
                    Some(content) => Ok(Box::pin(async move { Ok::<_, ProviderError>(content) })),
                    None => Err(ProviderError::rejected("unknown content")),
                }
            }
            RetrieveBehavior::Reject => Err(ProviderError::rejected("not accepting transfers")),
            RetrieveBehavior::Fail => Ok(Box::pin(async {
                Err::<Content, _>(ProviderError::failed("broken pipe"))
            })),
            RetrieveBehavior::Panic => Ok(Box::pin(explode())),
            RetrieveBehavior::Hang => {
                let guard = DropCounter(Arc::clone(&self.cancelled_retrievals));
                Ok(Box::pin(async move {
                    let _guard = guard;
                    std::future::pending::<Result<Content, ProviderError>>().await
                }))
            }
        }
    }

    async fn share(&self, content: &Content) -> Result<Vec<ContentShare>, ProviderError> {
        run_phase(self.share, "share").await?;
        self.insert(content.clone());
        Ok(vec![self.share_for(content.id().clone())])
    }

    async fn unshare(&self, id: &ContentId) -> Result<bool, ProviderError> {
        run_phase(self.unshare, "unshare").await?;
        Ok(self.store.lock().remove(id).is_some())
    }

    fn find_shares(&self, _max: usize, _ctx: CancellationToken) -> Result<ShareStream, ProviderError> {
        match &self.find {
            FindBehavior::Batches(sizes) => {
                let batches: Vec<Vec<ContentShare>> = sizes
                    .iter()
                    .enumerate()
                    .map(|(b, &n)| {
                        (0..n)
                            .map(|i| self.share_for(ContentId::new(format!("{}-{b}-{i}", self.name))))
                            .collect()
                    })
                    .collect();
                Ok(stream::iter(batches).boxed())
            }
            FindBehavior::Endless => {
                let guard = DropCounter(Arc::clone(&self.cancelled_finds));
                let name = self.name.clone();
                Ok(stream::unfold((0usize, guard), move |(i, guard)| {
                    let name = name.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        let id = ContentId::new(format!("{name}-{i}"));
                        let share = ContentShare::new(ShareAdvertisement::new(id), name.as_str());
                        Some((vec![share], (i + 1, guard)))
                    }
                })
                .boxed())
            }
            FindBehavior::Silent => Ok(stream::pending::<Vec<ContentShare>>().boxed()),
        }
    }

    fn as_managed(self: Arc<Self>) -> Option<Arc<dyn ManagedProvider>> {
        Some(self)
    }
}

#[async_trait]
impl ManagedProvider for MemoryProvider {
    fn advertisement(&self) -> Advertisement {
        Advertisement::Other {
            id: ModuleId::new(self.name.as_str()),
        }
    }

    async fn init(&self, _ctx: &ProviderContext) -> Result<(), ProviderError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        run_phase(self.init, "init").await
    }

    async fn start(&self) -> Result<(), ProviderError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        run_phase(self.start, "start").await
    }

    async fn stop(&self, _ctx: CancellationToken) -> Result<(), ProviderError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        run_phase(self.stop, "stop").await
    }
}

/// Lifecycle listener recording every state it is told about.
pub(crate) struct StateLog {
    states: watch::Sender<Vec<LifecycleState>>,
}

impl StateLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            states: watch::Sender::new(Vec::new()),
        })
    }

    pub(crate) fn states(&self) -> Vec<LifecycleState> {
        self.states.borrow().clone()
    }

    /// Resolves once `state` has been recorded.
    pub(crate) async fn wait_for(&self, state: LifecycleState) {
        let mut rx = self.states.subscribe();
        let reached = matches!(
            tokio::time::timeout(
                Duration::from_secs(5),
                rx.wait_for(|states| states.contains(&state)),
            )
            .await,
            Ok(Ok(_))
        );
        assert!(
            reached,
            "state {state:?} never reached; saw {:?}",
            self.states()
        );
    }
}

impl LifecycleListener for StateLog {
    fn state_changed(&self, _provider: &Arc<dyn ManagedProvider>, state: LifecycleState) {
        self.states.send_modify(|states| states.push(state));
    }
}

/// Content listener recording every event, optionally registering another
/// listener on its first event.
pub(crate) struct RecordingListener {
    events: Mutex<Vec<ContentEvent>>,
    add_on_event: Option<(Arc<ListenerSet>, Arc<RecordingListener>)>,
}

impl RecordingListener {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            add_on_event: None,
        })
    }

    /// Listener that adds `late` to `set` whenever it handles an event.
    pub(crate) fn adding_on_event(set: Arc<ListenerSet>, late: Arc<RecordingListener>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            add_on_event: Some((set, late)),
        })
    }

    pub(crate) fn events(&self) -> Vec<ContentEvent> {
        self.events.lock().clone()
    }

    /// Total shares received through `SharesFound` events.
    pub(crate) fn shares_found(&self) -> usize {
        self.events
            .lock()
            .iter()
            .map(|ev| match ev {
                ContentEvent::SharesFound { shares, .. } => shares.len(),
                _ => 0,
            })
            .sum()
    }

    /// Number of `SharesFound` events flagged as last.
    pub(crate) fn last_flags(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|ev| matches!(ev, ContentEvent::SharesFound { last: true, .. }))
            .count()
    }

    pub(crate) fn last_event_is_final(&self) -> bool {
        matches!(
            self.events.lock().last(),
            Some(ContentEvent::SharesFound { last: true, .. })
        )
    }
}

#[async_trait]
impl ContentListener for RecordingListener {
    async fn on_event(&self, event: &ContentEvent) {
        self.events.lock().push(event.clone());
        if let Some((set, late)) = &self.add_on_event {
            set.add(Arc::clone(late) as Arc<dyn ContentListener>);
        }
    }
}

/// Listener that panics on every event.
pub(crate) struct PanickingListener;

#[async_trait]
impl ContentListener for PanickingListener {
    async fn on_event(&self, _event: &ContentEvent) {
        panic!("listener exploded");
    }
}

pub(crate) fn provider_ctx(name: &str) -> ProviderContext {
    ProviderContext {
        group: PeerGroupContext::new("net", "urn:group", "urn:peer"),
        assigned_id: ModuleId::new(name),
        advertisement: Advertisement::Other {
            id: ModuleId::new(name),
        },
    }
}

/// Polls `cond` until it holds; panics after five seconds.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Collects the messages of `WARN` events emitted on the current thread.
#[derive(Clone, Default)]
pub(crate) struct WarnCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarnCapture {
    /// Installs the capture as the thread's default subscriber until the guard drops.
    pub(crate) fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        use tracing_subscriber::layer::SubscriberExt;

        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub(crate) fn count(&self, message: &str) -> usize {
        self.messages.lock().iter().filter(|m| m.as_str() == message).count()
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCapture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if *event.metadata().level() != tracing::Level::WARN {
            return;
        }
        let mut message = MessageField::default();
        event.record(&mut message);
        self.messages.lock().push(message.0);
    }
}

#[derive(Default)]
struct MessageField(String);

impl tracing::field::Visit for MessageField {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
