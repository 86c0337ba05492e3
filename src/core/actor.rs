//! # ProviderActor: single-provider lifecycle driver.
//!
//! Owns the lifecycle of one [`ManagedProvider`]. Commands arrive on an
//! unbounded channel and are applied strictly one after another, so every
//! transition of a provider (and every listener notification about it) is
//! serialized.
//!
//! ## Architecture
//! ```text
//! LifecycleManager ──► Command ──► ProviderActor::run()
//!
//! loop {
//!   ├─► recv command (Init | Start | Stop)
//!   ├─► illegal from current state?  → ignore
//!   ├─► transition(Initializing | Starting | Stopping)
//!   ├─► run_phase() ─────► provider.init()/start()/stop()
//!   │       ▼
//!   │     Ok  ──► transition(Initialized | Started | Stopped)
//!   │     Err ──► transition(Failed)
//!   └─► channel closed? → exit
//! }
//! ```
//!
//! ## Rules
//! - Each transition updates the shared state **before** listeners are told about it
//! - Listeners are called synchronously from the actor task, in transition order
//! - A retired provider ignores `Init`/`Start` still in the queue
//! - A re-added provider waits for its previous actor to exit before applying anything
//! - Forced removal only interrupts a stop already in flight; a queued stop still runs
//! - A stop interrupted by forced removal ends in `Stopped`; any other failure ends in `Failed`

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        lifecycle::LifecycleListener,
        runner::{Phase, run_phase},
        state::LifecycleState,
    },
    error::{ProviderError, panic_message},
    events::{Bus, Event, EventKind},
    monitor::SharedExecutor,
    provider::{ManagedProvider, ProviderContext},
};

/// Instruction for a provider actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Init,
    Start,
    Stop,
}

/// State shared between an actor and its registration record.
#[derive(Debug)]
pub(crate) struct ActorShared {
    state: Mutex<LifecycleState>,
    retired: AtomicBool,
    /// Token of the stop phase in flight, if any.
    stopping: Mutex<Option<CancellationToken>>,
}

impl ActorShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LifecycleState::Uninitialized),
            retired: AtomicBool::new(false),
            stopping: Mutex::new(None),
        })
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Marks the provider as leaving.
    ///
    /// With `force`, a stop sequence already running is interrupted. Nothing
    /// else is cancelled: the `Stop` queued by the removal still calls the
    /// provider's `stop()`.
    pub(crate) fn retire(&self, force: bool) {
        self.retired.store(true, Ordering::SeqCst);
        if force {
            if let Some(token) = self.stopping.lock().as_ref() {
                token.cancel();
            }
        }
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

/// Parameters shared by every actor of one manager.
#[derive(Clone)]
pub(crate) struct ActorParams {
    pub exec: SharedExecutor,
    pub bus: Bus,
    pub timeout: Option<Duration>,
    pub listeners: Arc<[Arc<dyn LifecycleListener>]>,
}

/// Drives one provider through its lifecycle.
pub(crate) struct ProviderActor {
    provider: Arc<dyn ManagedProvider>,
    ctx: ProviderContext,
    shared: Arc<ActorShared>,
    params: ActorParams,
    /// Actor of a previous registration of the same instance, still winding down.
    predecessor: Option<JoinHandle<()>>,
}

impl ProviderActor {
    pub(crate) fn new(
        provider: Arc<dyn ManagedProvider>,
        ctx: ProviderContext,
        shared: Arc<ActorShared>,
        params: ActorParams,
    ) -> Self {
        Self {
            provider,
            ctx,
            shared,
            params,
            predecessor: None,
        }
    }

    /// Defers every command until `join` has completed.
    pub(crate) fn after(mut self, join: JoinHandle<()>) -> Self {
        self.predecessor = Some(join);
        self
    }

    /// Runs until the command channel is closed and drained.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        if let Some(previous) = self.predecessor.take() {
            if let Err(e) = previous.await {
                tracing::warn!(provider = self.provider.name(), error = %e, "previous provider actor ended abnormally");
            }
        }
        while let Some(cmd) = rx.recv().await {
            self.apply(cmd).await;
        }
    }

    async fn apply(&self, cmd: Command) {
        let current = self.shared.state();
        let (entering, phase, done) = match cmd {
            Command::Init => (
                LifecycleState::Initializing,
                Phase::Init(self.ctx.clone()),
                LifecycleState::Initialized,
            ),
            Command::Start => (
                LifecycleState::Starting,
                Phase::Start,
                LifecycleState::Started,
            ),
            Command::Stop => (LifecycleState::Stopping, Phase::Stop, LifecycleState::Stopped),
        };

        if cmd != Command::Stop && self.shared.is_retired() {
            tracing::trace!(provider = self.provider.name(), ?cmd, "provider retired; command skipped");
            return;
        }
        if !current.can_transition_to(entering) {
            tracing::trace!(
                provider = self.provider.name(),
                ?cmd,
                state = current.as_label(),
                "command not applicable in current state"
            );
            return;
        }

        // Set before `Stopping` becomes observable to listeners.
        let token = CancellationToken::new();
        if cmd == Command::Stop {
            *self.shared.stopping.lock() = Some(token.clone());
        }
        self.transition(entering);
        let res = run_phase(
            Arc::clone(&self.provider),
            phase,
            &token,
            self.params.timeout,
            &self.params.exec,
            &self.params.bus,
        )
        .await;
        if cmd == Command::Stop {
            self.shared.stopping.lock().take();
        }

        match res {
            Ok(()) => self.transition(done),
            Err(ProviderError::Canceled) if cmd == Command::Stop => self.transition(done),
            Err(e) => {
                tracing::debug!(provider = self.provider.name(), error = %e, "provider moved to failed");
                self.transition(LifecycleState::Failed);
            }
        }
    }

    /// Records `next`, notifies every lifecycle listener and publishes the change.
    fn transition(&self, next: LifecycleState) {
        {
            let mut state = self.shared.state.lock();
            if !state.can_transition_to(next) {
                return;
            }
            *state = next;
        }

        for listener in self.params.listeners.iter() {
            let call = AssertUnwindSafe(|| listener.state_changed(&self.provider, next));
            if let Err(payload) = std::panic::catch_unwind(call) {
                tracing::warn!(
                    provider = self.provider.name(),
                    panic = %panic_message(payload.as_ref()),
                    "lifecycle listener panicked"
                );
            }
        }

        self.params.bus.publish(
            Event::new(EventKind::ProviderStateChanged)
                .with_provider(self.provider.name())
                .with_state(next),
        );
    }
}
