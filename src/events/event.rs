//! # Runtime events emitted by the content service.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Provider lifecycle**: registration, state transitions, failures, removal
//! - **Service / content**: service phases, shares, transfers and find queries
//! - **Diagnostics**: slow tasks and watchdog probes from the task monitor
//! - **Delivery faults**: panicking listeners/subscribers, subscriber overflow
//!
//! The [`Event`] struct carries additional metadata such as timestamps, provider
//! name, lifecycle state, reasons and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events about one provider are published by that provider's actor, in transition order.
//!
//! ## Example
//! ```rust
//! use contentvisor::{Event, EventKind, LifecycleState};
//!
//! let ev = Event::new(EventKind::ProviderStateChanged)
//!     .with_provider("http")
//!     .with_state(LifecycleState::Started);
//!
//! assert_eq!(ev.kind, EventKind::ProviderStateChanged);
//! assert_eq!(ev.provider.as_deref(), Some("http"));
//! assert_eq!(ev.state, Some(LifecycleState::Started));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::content::ContentId;
use crate::core::LifecycleState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Provider lifecycle ===
    /// Provider registered with the lifecycle manager.
    ///
    /// Sets:
    /// - `provider`: provider name
    /// - `reason`: assigned identity
    ProviderAdded,

    /// Provider moved to a new lifecycle state.
    ///
    /// Sets:
    /// - `provider`: provider name
    /// - `state`: the new state
    ProviderStateChanged,

    /// A lifecycle phase of the provider failed; the provider is now `Failed`.
    ///
    /// Sets:
    /// - `provider`: provider name
    /// - `reason`: failure message
    ProviderFailed,

    /// Provider unregistered from the lifecycle manager.
    ///
    /// Sets:
    /// - `provider`: provider name
    ProviderRemoved,

    // === Service ===
    /// Service initialized; pending providers handed to the lifecycle manager.
    ///
    /// Sets:
    /// - `count`: number of drained pending providers
    ServiceInitialized,

    /// Service started.
    ServiceStarted,

    /// Service stopped.
    ServiceStopped,

    // === Content ===
    /// Content shared by at least one provider.
    ///
    /// Sets:
    /// - `content`: content id
    /// - `count`: number of shares produced
    ContentShared,

    /// Content unshared by at least one provider.
    ///
    /// Sets:
    /// - `content`: content id
    ContentUnshared,

    /// Aggregate transfer finished (any terminal state).
    ///
    /// Sets:
    /// - `content`: content id
    /// - `reason`: terminal state label
    TransferFinished,

    /// Find-shares query finished.
    ///
    /// Sets:
    /// - `count`: shares delivered
    FindFinished,

    // === Diagnostics ===
    /// Task waited in the pool queue longer than the configured threshold.
    ///
    /// Sets:
    /// - `reason`: task label
    /// - `elapsed_ms`: queue latency
    TaskQueuedTooLong,

    /// Task ran longer than the configured threshold.
    ///
    /// Sets:
    /// - `reason`: task label
    /// - `elapsed_ms`: execution time
    TaskRanTooLong,

    /// Watchdog observed a task still running.
    ///
    /// Sets:
    /// - `reason`: task label and worker thread
    /// - `elapsed_ms`: time since the task started
    WatchdogProbe,

    // === Delivery faults ===
    /// A content listener panicked during notification.
    ///
    /// Sets:
    /// - `provider`: listener name
    /// - `reason`: panic info
    ListenerPanicked,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `provider`: subscriber name
    /// - `reason`: panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `provider`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Provider (or subscriber/listener) name, if applicable.
    pub provider: Option<Arc<str>>,
    /// Lifecycle state carried by `ProviderStateChanged`.
    pub state: Option<LifecycleState>,
    /// Content the event is about.
    pub content: Option<ContentId>,
    /// Human-readable reason (errors, labels, overflow details).
    pub reason: Option<Arc<str>>,
    /// Duration in milliseconds (compact).
    pub elapsed_ms: Option<u64>,
    /// Item count (shares, providers).
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            provider: None,
            state: None,
            content: None,
            reason: None,
            elapsed_ms: None,
            count: None,
        }
    }

    /// Attaches a provider name.
    #[inline]
    pub fn with_provider(mut self, provider: impl Into<Arc<str>>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attaches a lifecycle state.
    #[inline]
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a content id.
    #[inline]
    pub fn with_content(mut self, id: ContentId) -> Self {
        self.content = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches an item count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n.min(u32::MAX as usize) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_provider(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_provider(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ServiceStarted);
        let b = Event::new(EventKind::ServiceStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders_set_fields() {
        let ev = Event::new(EventKind::TaskRanTooLong)
            .with_reason("transfer:http")
            .with_elapsed(Duration::from_millis(350))
            .with_count(3)
            .with_content(ContentId::new("c"));
        assert_eq!(ev.elapsed_ms, Some(350));
        assert_eq!(ev.count, Some(3));
        assert_eq!(ev.reason.as_deref(), Some("transfer:http"));
        assert_eq!(ev.content, Some(ContentId::new("c")));
    }

    #[test]
    fn test_subscriber_overflow_helper() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.provider.as_deref(), Some("audit"));
    }
}
