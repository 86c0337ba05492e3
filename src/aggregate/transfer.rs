//! # Transfer aggregator: one logical retrieval over many providers.
//!
//! ```text
//! retrieve(target, snapshot)
//!   ├─ for each provider supporting Retrieve:
//!   │     provider.retrieve(target, child_token)
//!   │        ├─ Ok(fut)  → child (Pending)
//!   │        └─ Err(e)   → rejection
//!   ├─ no child → Err(NoProviders | AllRejected)
//!   └─ spawn every child on the SharedExecutor (timeout, panic capture)
//!
//! child finishes ──► ChildStatus ──► TransferState::aggregate(children) ──► watch
//!   first Succeeded → result = content, cancel the other children
//! ```
//!
//! ## Rules
//! - The set of children is fixed at construction; later providers never join
//! - The aggregate state is always recomputed from the children, never stored on its own
//! - A slow child never delays success reported by a faster one
//! - Dropping the [`TransferHandle`] cancels every child still running

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    content::{Content, ContentId, RetrieveTarget},
    error::{ProviderError, TransferError, panic_message},
    events::{Bus, Event, EventKind},
    monitor::SharedExecutor,
    provider::{BoxTransferFuture, ManagedProvider, Operation},
};

/// Status of one provider's part of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

/// Overall status of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferState {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl TransferState {
    /// Derives the aggregate status from the children.
    ///
    /// Any success wins; otherwise the transfer is pending while any child is;
    /// otherwise it is cancelled if any child was cancelled, and failed if every
    /// child failed.
    pub fn aggregate(children: &[ChildStatus]) -> Self {
        if children.contains(&ChildStatus::Succeeded) {
            TransferState::Succeeded
        } else if children.contains(&ChildStatus::Pending) {
            TransferState::Pending
        } else if children.contains(&ChildStatus::Canceled) {
            TransferState::Canceled
        } else {
            TransferState::Failed
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferState::Pending)
    }

    pub fn as_label(self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Succeeded => "succeeded",
            TransferState::Failed => "failed",
            TransferState::Canceled => "canceled",
        }
    }
}

/// Builds aggregate transfers over registry snapshots.
#[derive(Clone, Debug)]
pub struct TransferAggregator {
    exec: SharedExecutor,
    timeout: Option<Duration>,
    bus: Option<Bus>,
}

impl TransferAggregator {
    /// `timeout` bounds each provider's part of a transfer.
    pub fn new(exec: SharedExecutor, timeout: Option<Duration>) -> Self {
        Self {
            exec,
            timeout,
            bus: None,
        }
    }

    /// Also publishes `TransferFinished` on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Starts retrieving `target` from every provider in `snapshot` that supports it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn retrieve(
        &self,
        target: &RetrieveTarget,
        snapshot: &[Arc<dyn ManagedProvider>],
    ) -> Result<TransferHandle, TransferError> {
        let token = CancellationToken::new();
        let mut children: Vec<(Arc<str>, BoxTransferFuture, CancellationToken)> = Vec::new();
        let mut reasons = Vec::new();

        for provider in snapshot {
            if !provider.supports(Operation::Retrieve) {
                tracing::trace!(provider = provider.name(), "retrieve unsupported; skipped");
                continue;
            }
            let child = token.child_token();
            match provider.retrieve(target, child.clone()) {
                Ok(fut) => children.push((Arc::from(provider.name()), fut, child)),
                Err(e) if e.is_unsupported() => {
                    tracing::trace!(provider = provider.name(), "retrieve unsupported; skipped");
                }
                Err(e) => {
                    tracing::debug!(provider = provider.name(), error = %e, "retrieve rejected");
                    reasons.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        if children.is_empty() {
            return Err(if reasons.is_empty() {
                TransferError::NoProviders
            } else {
                TransferError::AllRejected { reasons }
            });
        }

        let (state_tx, _) = watch::channel(TransferState::Pending);
        let shared = Arc::new(Shared {
            content_id: target.content_id().clone(),
            children: Mutex::new(
                children
                    .iter()
                    .map(|(name, _, _)| (Arc::clone(name), ChildStatus::Pending))
                    .collect(),
            ),
            result: Mutex::new(None),
            state_tx,
            token: token.clone(),
            bus: self.bus.clone(),
        });

        for (idx, (name, fut, child)) in children.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            let timeout = self.timeout;
            let label = format!("transfer:{name}");
            self.exec.spawn(label, async move {
                let outcome = run_child(fut, &child, timeout).await;
                if let Err(e) = &outcome {
                    tracing::debug!(provider = %name, error = %e, "transfer child ended without content");
                }
                shared.child_finished(idx, outcome);
            });
        }

        Ok(TransferHandle { shared, token })
    }
}

async fn run_child(
    fut: BoxTransferFuture,
    child: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<Content, ProviderError> {
    let guarded = async {
        AssertUnwindSafe(fut).catch_unwind().await.unwrap_or_else(|payload| {
            Err(ProviderError::Panicked {
                info: panic_message(payload.as_ref()),
            })
        })
    };
    let bounded = async {
        match timeout {
            Some(dur) => time::timeout(dur, guarded)
                .await
                .unwrap_or(Err(ProviderError::Timeout { timeout: dur })),
            None => guarded.await,
        }
    };
    tokio::select! {
        biased;
        _ = child.cancelled() => Err(ProviderError::Canceled),
        r = bounded => r,
    }
}

struct Shared {
    content_id: ContentId,
    children: Mutex<Vec<(Arc<str>, ChildStatus)>>,
    result: Mutex<Option<Result<Content, TransferError>>>,
    state_tx: watch::Sender<TransferState>,
    token: CancellationToken,
    bus: Option<Bus>,
}

impl Shared {
    fn statuses(&self) -> Vec<ChildStatus> {
        self.children.lock().iter().map(|(_, s)| *s).collect()
    }

    fn child_finished(&self, idx: usize, outcome: Result<Content, ProviderError>) {
        let status = match &outcome {
            Ok(_) => ChildStatus::Succeeded,
            Err(ProviderError::Canceled) => ChildStatus::Canceled,
            Err(_) => ChildStatus::Failed,
        };

        // Status update, result decision and watch publication happen under one
        // lock so the first child to observe a terminal aggregate is the one that caused it.
        let finished = {
            let mut children = self.children.lock();
            if let Some(slot) = children.get_mut(idx) {
                slot.1 = status;
            }
            let statuses: Vec<ChildStatus> = children.iter().map(|(_, s)| *s).collect();
            let state = TransferState::aggregate(&statuses);

            let mut finished = None;
            if state.is_terminal() {
                let mut result = self.result.lock();
                if result.is_none() {
                    *result = Some(match (state, outcome) {
                        (TransferState::Succeeded, Ok(content)) => Ok(content),
                        (TransferState::Canceled, _) => Err(TransferError::Canceled),
                        _ => Err(TransferError::AllFailed),
                    });
                    finished = Some(state);
                }
            }
            self.state_tx.send_replace(state);
            finished
        };

        if let Some(state) = finished {
            self.finish(state);
        }
    }

    fn finish(&self, state: TransferState) {
        // first success makes the remaining children redundant
        self.token.cancel();
        tracing::debug!(content = %self.content_id, state = state.as_label(), "transfer finished");
        if let Some(bus) = &self.bus {
            bus.publish(
                Event::new(EventKind::TransferFinished)
                    .with_content(self.content_id.clone())
                    .with_reason(state.as_label()),
            );
        }
    }
}

/// Caller's view of one aggregate transfer.
pub struct TransferHandle {
    shared: Arc<Shared>,
    token: CancellationToken,
}

impl TransferHandle {
    pub fn content_id(&self) -> &ContentId {
        &self.shared.content_id
    }

    /// Aggregate status, derived from the children right now.
    pub fn status(&self) -> TransferState {
        TransferState::aggregate(&self.shared.statuses())
    }

    /// Per-provider statuses in construction order.
    pub fn child_statuses(&self) -> Vec<(Arc<str>, ChildStatus)> {
        self.shared.children.lock().clone()
    }

    /// Watches the aggregate status.
    pub fn subscribe(&self) -> watch::Receiver<TransferState> {
        self.shared.state_tx.subscribe()
    }

    /// Cancels every child still running.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for a terminal status and returns the retrieved content.
    pub async fn wait(&self) -> Result<Content, TransferError> {
        let mut rx = self.subscribe();
        if rx.wait_for(|s| s.is_terminal()).await.is_err() {
            return Err(TransferError::Canceled);
        }
        self.shared
            .result
            .lock()
            .clone()
            .unwrap_or(Err(TransferError::Canceled))
    }
}

impl Drop for TransferHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("content_id", &self.shared.content_id)
            .field("status", &self.status())
            .finish()
    }
}
