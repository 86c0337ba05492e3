//! # Event aggregator: bounded find-shares across providers.
//!
//! ```text
//! dispatch_find(max)
//!   ├─ provider 1 ── find_shares(max, child) ── stream ──┐
//!   ├─ provider 2 ── find_shares(max, child) ── stream ──┼──► mpsc ──► merge loop
//!   └─ provider N ── (unsupported: skipped)              │              │
//!                                                        │   truncate to remaining cap
//!                                                        │   notify SharesFound{last}
//!                                                        │   cap reached → cancel all queries
//!                                                        └──────────────┘
//! ```
//!
//! ## Rules
//! - At most `max` shares are delivered in total, across all providers
//! - Results are forwarded as they arrive; a silent provider never holds back the others
//! - Exactly one `SharesFound { last: true }` is delivered per query, always last
//! - Each provider query is bounded by the find timeout and runs under its own child token

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    content::ContentShare,
    core::ProviderSnapshot,
    events::{Bus, Event, EventKind},
    listeners::{ContentEvent, ListenerSet},
    monitor::SharedExecutor,
    provider::Operation,
};

/// Capacity of the batch channel between provider queries and the merge loop.
const BATCH_QUEUE: usize = 64;

/// Fans one find-shares request out to a registry snapshot.
pub struct EventAggregator {
    listeners: Arc<ListenerSet>,
    snapshot: ProviderSnapshot,
    exec: SharedExecutor,
    timeout: Option<Duration>,
    bus: Option<Bus>,
}

impl EventAggregator {
    /// `timeout` bounds each provider's query.
    pub fn new(
        listeners: Arc<ListenerSet>,
        snapshot: ProviderSnapshot,
        exec: SharedExecutor,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            listeners,
            snapshot,
            exec,
            timeout,
            bus: None,
        }
    }

    /// Also publishes `FindFinished` on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Starts the query. Must be called inside a tokio runtime.
    pub fn dispatch_find(self, max: usize) -> FindHandle {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<Vec<ContentShare>>(BATCH_QUEUE);

        let mut queried = 0usize;
        for provider in self.snapshot.iter() {
            if max == 0 {
                break;
            }
            if !provider.supports(Operation::FindShares) {
                tracing::trace!(provider = provider.name(), "find shares unsupported; skipped");
                continue;
            }
            let child = token.child_token();
            let mut stream = match provider.find_shares(max, child.clone()) {
                Ok(stream) => stream,
                Err(e) if e.is_unsupported() => {
                    tracing::trace!(provider = provider.name(), "find shares unsupported; skipped");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(provider = provider.name(), error = %e, "find shares rejected");
                    continue;
                }
            };

            queried += 1;
            let tx = tx.clone();
            let timeout = self.timeout;
            let name: Arc<str> = Arc::from(provider.name());
            self.exec.spawn(format!("find:{name}"), async move {
                let forward = async {
                    while let Some(batch) = stream.next().await {
                        if tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                };
                let bounded = async {
                    match timeout {
                        Some(dur) => {
                            if time::timeout(dur, forward).await.is_err() {
                                tracing::debug!(provider = %name, ?dur, "find query timed out");
                            }
                        }
                        None => forward.await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = child.cancelled() => {}
                    _ = bounded => {}
                }
                child.cancel();
            });
        }
        drop(tx);
        tracing::debug!(max, providers = queried, "find shares dispatched");

        let merge = tokio::spawn(merge(
            rx,
            max,
            token.clone(),
            self.listeners,
            self.bus,
        ));
        FindHandle { token, merge }
    }
}

async fn merge(
    mut rx: mpsc::Receiver<Vec<ContentShare>>,
    max: usize,
    token: CancellationToken,
    listeners: Arc<ListenerSet>,
    bus: Option<Bus>,
) -> usize {
    let mut delivered = 0usize;
    let mut closed = false;

    while delivered < max {
        let mut batch = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            b = rx.recv() => match b {
                Some(b) => b,
                None => break,
            },
        };
        batch.truncate(max - delivered);
        if batch.is_empty() {
            continue;
        }
        delivered += batch.len();
        let last = delivered >= max;
        if last {
            token.cancel();
        }
        listeners
            .notify(&ContentEvent::SharesFound { shares: batch, last })
            .await;
        closed = last;
    }

    token.cancel();
    if !closed {
        listeners
            .notify(&ContentEvent::SharesFound {
                shares: Vec::new(),
                last: true,
            })
            .await;
    }

    tracing::debug!(delivered, max, "find shares finished");
    if let Some(bus) = bus {
        bus.publish(Event::new(EventKind::FindFinished).with_count(delivered));
    }
    delivered
}

/// Caller's view of one find-shares query.
///
/// Dropping the handle does not cancel the query; results keep flowing to the
/// listeners until the cap is reached or every provider is done.
#[derive(Debug)]
pub struct FindHandle {
    token: CancellationToken,
    merge: JoinHandle<usize>,
}

impl FindHandle {
    /// Stops the query; the final `last = true` event is still delivered.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.merge.is_finished()
    }

    /// Waits for the query to end and returns how many shares were delivered.
    pub async fn wait(self) -> usize {
        match self.merge.await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "find merge loop ended abnormally");
                0
            }
        }
    }
}
