//! # Provider lifecycle manager.
//!
//! Owns one registration record per provider and one [`ProviderActor`] per record.
//! The manager remembers the phase the service asked for (its *target*), so a
//! provider added late is driven straight to where the others already are.
//!
//! ## Architecture
//! ```text
//! add_provider(p) ─► Record{actor, shared} ─► commands for current target
//! init()          ─► target = Initialized (only from idle) ─► Init to every actor
//! start()         ─► target = Started     ─► Init, Start to every actor
//! stop()          ─► target = Stopped     ─► Stop to every actor
//! remove_provider ─► take record ─► retire(force) ─► Stop ─► close channel ─► retiring
//! add_provider(p) again while p is retiring ─► new actor waits for the old one to exit
//!
//! ProviderActor ── state_changed(p, s) ──► LifecycleListener (e.g. ProviderRegistry)
//!               ── ProviderStateChanged ──► Bus
//! ```
//!
//! ## Rules
//! - At most one record per provider instance (identity is the `Arc` pointer)
//! - Every public method returns once commands are queued, never after the transition
//! - The internal lock is never held across an `.await` or a call into provider code
//! - Removing an unknown provider returns `false` and does nothing else
//! - Notifications of one provider instance never interleave across registrations
//! - `init()` never lowers a target already past `Initialized`

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    content::ModuleId,
    core::{
        actor::{ActorParams, ActorShared, Command, ProviderActor},
        state::LifecycleState,
    },
    events::{Bus, Event, EventKind},
    monitor::SharedExecutor,
    provider::{ManagedProvider, ProviderContext, provider_key},
};

/// Observer of provider state transitions.
///
/// Called synchronously from the provider's actor, once per transition and in
/// transition order for any single provider. Implementations must be idempotent
/// and must not block.
pub trait LifecycleListener: Send + Sync + 'static {
    fn state_changed(&self, provider: &Arc<dyn ManagedProvider>, state: LifecycleState);
}

/// Point-in-time view of one registration record.
#[derive(Clone)]
pub struct ProviderRecord {
    pub provider: Arc<dyn ManagedProvider>,
    pub state: LifecycleState,
    pub assigned_id: ModuleId,
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("provider", &self.provider.name())
            .field("state", &self.state)
            .field("assigned_id", &self.assigned_id)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Idle,
    Initialized,
    Started,
    Stopped,
}

impl Target {
    fn commands(self) -> &'static [Command] {
        match self {
            Target::Idle => &[],
            Target::Initialized | Target::Stopped => &[Command::Init],
            Target::Started => &[Command::Init, Command::Start],
        }
    }
}

struct Record {
    provider: Arc<dyn ManagedProvider>,
    assigned_id: ModuleId,
    shared: Arc<ActorShared>,
    commands: mpsc::UnboundedSender<Command>,
    join: JoinHandle<()>,
}

impl Record {
    fn send(&self, cmd: Command) {
        // The actor only exits after the sender is dropped.
        let _ = self.commands.send(cmd);
    }

    fn snapshot(&self) -> ProviderRecord {
        ProviderRecord {
            provider: Arc::clone(&self.provider),
            state: self.shared.state(),
            assigned_id: self.assigned_id.clone(),
        }
    }
}

struct Inner {
    target: Target,
    records: HashMap<usize, Record>,
    /// Insertion order of `records` keys.
    order: Vec<usize>,
    /// Actors of removed providers that may still be running their stop.
    retiring: HashMap<usize, JoinHandle<()>>,
}

/// Authoritative owner of provider registration records.
pub struct LifecycleManager {
    inner: Mutex<Inner>,
    params: ActorParams,
}

impl LifecycleManager {
    /// Creates a manager whose actors report to `listeners`.
    pub fn new(
        exec: SharedExecutor,
        bus: Bus,
        timeout: Option<std::time::Duration>,
        listeners: Vec<Arc<dyn LifecycleListener>>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                target: Target::Idle,
                records: HashMap::new(),
                order: Vec::new(),
                retiring: HashMap::new(),
            }),
            params: ActorParams {
                exec,
                bus,
                timeout,
                listeners: Arc::from(listeners),
            },
        }
    }

    /// Registers `provider` and schedules it towards the current target.
    ///
    /// Returns `false` if the same instance is already registered. Must be called
    /// inside a tokio runtime.
    pub fn add_provider(
        &self,
        provider: Arc<dyn ManagedProvider>,
        ctx: ProviderContext,
        assigned_id: ModuleId,
    ) -> bool {
        let key = provider_key(&provider);
        let mut inner = self.inner.lock();
        if inner.records.contains_key(&key) {
            tracing::debug!(provider = provider.name(), "provider already registered");
            return false;
        }

        let shared = ActorShared::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut actor = ProviderActor::new(
            Arc::clone(&provider),
            ctx,
            Arc::clone(&shared),
            self.params.clone(),
        );
        if let Some(previous) = inner.retiring.remove(&key) {
            tracing::debug!(provider = provider.name(), "provider re-added while retiring");
            actor = actor.after(previous);
        }
        let join = tokio::spawn(actor.run(rx));

        let record = Record {
            provider: Arc::clone(&provider),
            assigned_id: assigned_id.clone(),
            shared,
            commands: tx,
            join,
        };
        for cmd in inner.target.commands() {
            record.send(*cmd);
        }
        inner.records.insert(key, record);
        inner.order.push(key);
        drop(inner);

        tracing::debug!(provider = provider.name(), id = %assigned_id, "provider registered");
        self.params.bus.publish(
            Event::new(EventKind::ProviderAdded)
                .with_provider(provider.name())
                .with_reason(assigned_id.as_str()),
        );
        true
    }

    /// Unregisters `provider`; a started provider is stopped on its way out.
    ///
    /// With `force`, a stop sequence already in flight is interrupted through its
    /// cancellation token; otherwise the provider's `stop()` still runs once.
    /// Returns `false` if the provider is not registered.
    pub fn remove_provider(&self, provider: &Arc<dyn ManagedProvider>, force: bool) -> bool {
        let key = provider_key(provider);
        let mut inner = self.inner.lock();
        let Some(record) = inner.records.remove(&key) else {
            return false;
        };
        inner.order.retain(|k| *k != key);
        inner.retiring.retain(|_, j| !j.is_finished());
        let join = self.retire(record, force);
        inner.retiring.insert(key, join);
        true
    }

    /// Initializes every registered provider.
    ///
    /// The target is raised to `Initialized` only from idle; after `start()` it
    /// stays `Started`, so providers added later are still started.
    pub fn init(&self) {
        self.drive(
            |t| if t == Target::Idle { Target::Initialized } else { t },
            &[Command::Init],
        );
    }

    /// Starts every registered provider (initializing those that are not yet).
    pub fn start(&self) {
        self.drive(|_| Target::Started, &[Command::Init, Command::Start]);
    }

    /// Stops every started provider.
    pub fn stop(&self) {
        self.drive(|_| Target::Stopped, &[Command::Stop]);
    }

    /// Current state of `provider`, or `None` if it is not registered.
    pub fn state_of(&self, provider: &Arc<dyn ManagedProvider>) -> Option<LifecycleState> {
        self.inner
            .lock()
            .records
            .get(&provider_key(provider))
            .map(|r| r.shared.state())
    }

    /// Snapshot of every registration record, in registration order.
    pub fn records(&self) -> Vec<ProviderRecord> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|k| inner.records.get(k))
            .map(Record::snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops and removes every provider, then waits for all actors to finish.
    pub async fn shutdown(&self) {
        let (records, retiring): (Vec<Record>, Vec<JoinHandle<()>>) = {
            let mut inner = self.inner.lock();
            inner.target = Target::Stopped;
            let order = std::mem::take(&mut inner.order);
            let records: Vec<Record> = order
                .into_iter()
                .filter_map(|k| inner.records.remove(&k))
                .collect();
            let retiring: Vec<JoinHandle<()>> = inner.retiring.drain().map(|(_, j)| j).collect();
            (records, retiring)
        };

        let mut joins = retiring;
        for record in records {
            joins.push(self.retire(record, false));
        }
        for join in joins {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "provider actor ended abnormally");
            }
        }
    }

    fn drive(&self, target: impl FnOnce(Target) -> Target, cmds: &[Command]) {
        let mut inner = self.inner.lock();
        inner.target = target(inner.target);
        for key in &inner.order {
            if let Some(record) = inner.records.get(key) {
                for cmd in cmds {
                    record.send(*cmd);
                }
            }
        }
    }

    /// Queues the final `Stop` and closes the command channel. Returns the actor's handle.
    fn retire(&self, record: Record, force: bool) -> JoinHandle<()> {
        record.shared.retire(force);
        record.send(Command::Stop);
        tracing::debug!(provider = record.provider.name(), force, "provider unregistered");
        self.params
            .bus
            .publish(Event::new(EventKind::ProviderRemoved).with_provider(record.provider.name()));
        record.join
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::registry::ProviderRegistry;
    use crate::test_support::{MemoryProvider, PhaseBehavior, StateLog, provider_ctx, wait_until};

    fn manager(log: &Arc<StateLog>) -> LifecycleManager {
        LifecycleManager::new(
            SharedExecutor::default(),
            Bus::new(256),
            Some(Duration::from_secs(1)),
            vec![log.clone() as Arc<dyn LifecycleListener>],
        )
    }

    fn add(m: &LifecycleManager, p: &Arc<dyn ManagedProvider>) -> bool {
        m.add_provider(Arc::clone(p), provider_ctx(p.name()), ModuleId::new(p.name()))
    }

    #[tokio::test]
    async fn test_added_before_init_waits_for_target() {
        let log = StateLog::new();
        let m = manager(&log);
        let p: Arc<dyn ManagedProvider> = MemoryProvider::arc("a");
        assert!(add(&m, &p));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(m.state_of(&p), Some(LifecycleState::Uninitialized));

        m.start();
        wait_until(|| m.state_of(&p) == Some(LifecycleState::Started)).await;
    }

    #[tokio::test]
    async fn test_late_provider_driven_to_current_target() {
        let log = StateLog::new();
        let m = manager(&log);
        m.init();
        m.start();
        let p: Arc<dyn ManagedProvider> = MemoryProvider::arc("late");
        add(&m, &p);
        wait_until(|| m.state_of(&p) == Some(LifecycleState::Started)).await;
    }

    #[tokio::test]
    async fn test_duplicate_add_keeps_one_record() {
        let log = StateLog::new();
        let m = manager(&log);
        let p: Arc<dyn ManagedProvider> = MemoryProvider::arc("a");
        assert!(add(&m, &p));
        assert!(!add(&m, &p));
        assert_eq!(m.len(), 1);
        assert_eq!(m.records()[0].assigned_id, ModuleId::new("a"));
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_provider() {
        let log = StateLog::new();
        let m = manager(&log);
        let bad: Arc<dyn ManagedProvider> =
            MemoryProvider::new("bad").with_start(PhaseBehavior::Panic).into_arc();
        let good: Arc<dyn ManagedProvider> = MemoryProvider::arc("good");
        add(&m, &bad);
        add(&m, &good);
        m.start();

        wait_until(|| {
            m.state_of(&bad) == Some(LifecycleState::Failed)
                && m.state_of(&good) == Some(LifecycleState::Started)
        })
        .await;
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let log = StateLog::new();
        let m = manager(&log);
        let p: Arc<dyn ManagedProvider> = MemoryProvider::arc("ghost");
        assert!(!m.remove_provider(&p, true));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(log.states().is_empty());
    }

    #[tokio::test]
    async fn test_remove_stops_started_provider() {
        let log = StateLog::new();
        let m = manager(&log);
        let p = MemoryProvider::arc("a");
        let dynp: Arc<dyn ManagedProvider> = p.clone();
        add(&m, &dynp);
        m.start();
        wait_until(|| m.state_of(&dynp) == Some(LifecycleState::Started)).await;

        assert!(m.remove_provider(&dynp, false));
        assert_eq!(m.state_of(&dynp), None);
        log.wait_for(LifecycleState::Stopped).await;
        assert_eq!(p.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_forced_remove_interrupts_slow_stop() {
        let log = StateLog::new();
        let m = LifecycleManager::new(
            SharedExecutor::default(),
            Bus::new(64),
            None,
            vec![log.clone() as Arc<dyn LifecycleListener>],
        );
        let p: Arc<dyn ManagedProvider> =
            MemoryProvider::new("slow").with_stop(PhaseBehavior::Hang).into_arc();
        add(&m, &p);
        m.start();
        wait_until(|| m.state_of(&p) == Some(LifecycleState::Started)).await;

        m.stop();
        log.wait_for(LifecycleState::Stopping).await;
        assert!(m.remove_provider(&p, true));
        tokio::time::timeout(Duration::from_millis(500), log.wait_for(LifecycleState::Stopped))
            .await
            .expect("forced removal did not interrupt stop");
    }

    #[tokio::test]
    async fn test_forced_remove_of_started_provider_runs_stop_once() {
        let log = StateLog::new();
        let m = manager(&log);
        let p = MemoryProvider::arc("a");
        let dynp: Arc<dyn ManagedProvider> = p.clone();
        add(&m, &dynp);
        m.start();
        wait_until(|| m.state_of(&dynp) == Some(LifecycleState::Started)).await;

        assert!(m.remove_provider(&dynp, true));
        log.wait_for(LifecycleState::Stopped).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(p.stop_calls(), 1);
        assert!(!log.states().contains(&LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_readd_during_slow_stop_stays_registered() {
        let reg = Arc::new(ProviderRegistry::new());
        let m = LifecycleManager::new(
            SharedExecutor::default(),
            Bus::new(256),
            Some(Duration::from_secs(1)),
            vec![reg.clone() as Arc<dyn LifecycleListener>],
        );
        let p = MemoryProvider::new("slow")
            .with_stop(PhaseBehavior::Slow(Duration::from_millis(150)))
            .into_arc();
        let dynp: Arc<dyn ManagedProvider> = p.clone();
        add(&m, &dynp);
        m.start();
        wait_until(|| reg.contains(&dynp)).await;

        assert!(m.remove_provider(&dynp, false));
        wait_until(|| p.stop_calls() == 1).await;
        assert!(add(&m, &dynp));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(m.state_of(&dynp), Some(LifecycleState::Started));
        assert!(reg.contains(&dynp));
        assert_eq!(p.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_init_after_start_keeps_started_target() {
        let log = StateLog::new();
        let m = manager(&log);
        m.start();
        m.init();
        let p: Arc<dyn ManagedProvider> = MemoryProvider::arc("late");
        add(&m, &p);
        wait_until(|| m.state_of(&p) == Some(LifecycleState::Started)).await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_removed_providers() {
        let log = StateLog::new();
        let m = manager(&log);
        let p = MemoryProvider::new("slow")
            .with_stop(PhaseBehavior::Slow(Duration::from_millis(100)))
            .into_arc();
        let dynp: Arc<dyn ManagedProvider> = p.clone();
        add(&m, &dynp);
        m.start();
        wait_until(|| m.state_of(&dynp) == Some(LifecycleState::Started)).await;

        m.remove_provider(&dynp, false);
        m.shutdown().await;
        assert_eq!(log.states().last(), Some(&LifecycleState::Stopped));
    }

    #[tokio::test]
    async fn test_records_follow_registration_order() {
        let log = StateLog::new();
        let m = manager(&log);
        for name in ["c", "a", "b"] {
            let p: Arc<dyn ManagedProvider> = MemoryProvider::arc(name);
            add(&m, &p);
        }
        let names: Vec<_> = m.records().iter().map(|r| r.provider.name().to_string()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything_and_clears_records() {
        let log = StateLog::new();
        let m = manager(&log);
        let a = MemoryProvider::arc("a");
        let b = MemoryProvider::arc("b");
        add(&m, &(a.clone() as Arc<dyn ManagedProvider>));
        add(&m, &(b.clone() as Arc<dyn ManagedProvider>));
        m.start();
        wait_until(|| m.records().iter().all(|r| r.state == LifecycleState::Started)).await;

        m.shutdown().await;
        assert!(m.is_empty());
        assert_eq!(a.stop_calls(), 1);
        assert_eq!(b.stop_calls(), 1);
    }
}
