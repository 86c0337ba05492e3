//! # Copy-on-write listener set.
//!
//! ```text
//! add / remove ──► writer lock ──► clone Vec ──► store(new Arc)
//!
//! notify(ev) ──► load() (snapshot) ──► l1.on_event ──► l2.on_event ──► ...
//!                                         └─ panic → warn + ListenerPanicked, continue
//! ```
//!
//! ## Rules
//! - A notification pass iterates the snapshot taken when it began
//! - Delivery follows insertion order
//! - Registering the same instance twice is ignored; removal is by pointer identity

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::error::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{ContentEvent, ContentListener};

fn same(a: &Arc<dyn ContentListener>, b: &Arc<dyn ContentListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Ordered set of content listeners.
pub struct ListenerSet {
    listeners: ArcSwap<Vec<Arc<dyn ContentListener>>>,
    writer: Mutex<()>,
    bus: Option<Bus>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            bus: None,
        }
    }

    /// Set holding exactly `listener`.
    pub fn single(listener: Arc<dyn ContentListener>) -> Self {
        let set = Self::new();
        set.add(listener);
        set
    }

    /// Also publishes `ListenerPanicked` on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Appends `listener`. Returns `false` if this instance is already present.
    pub fn add(&self, listener: Arc<dyn ContentListener>) -> bool {
        let _w = self.writer.lock();
        let current = self.listeners.load();
        if current.iter().any(|l| same(l, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(listener);
        self.listeners.store(Arc::new(next));
        true
    }

    /// Removes `listener`. Returns `false` if it was not present.
    pub fn remove(&self, listener: &Arc<dyn ContentListener>) -> bool {
        let _w = self.writer.lock();
        let current = self.listeners.load();
        if !current.iter().any(|l| same(l, listener)) {
            return false;
        }
        let next: Vec<_> = current.iter().filter(|l| !same(l, listener)).cloned().collect();
        self.listeners.store(Arc::new(next));
        true
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener registered when the pass begins.
    ///
    /// Returns how many listeners handled it without panicking.
    pub async fn notify(&self, event: &ContentEvent) -> usize {
        let snapshot = self.listeners.load_full();
        let mut delivered = 0;
        for listener in snapshot.iter() {
            let res = AssertUnwindSafe(listener.on_event(event)).catch_unwind().await;
            match res {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let info = panic_message(payload.as_ref());
                    tracing::warn!(
                        listener = listener.name(),
                        event = event.as_label(),
                        panic = %info,
                        "content listener panicked"
                    );
                    if let Some(bus) = &self.bus {
                        bus.publish(
                            Event::new(EventKind::ListenerPanicked)
                                .with_provider(listener.name())
                                .with_reason(info),
                        );
                    }
                }
            }
        }
        delivered
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentId;
    use crate::test_support::{PanickingListener, RecordingListener};

    fn unshared() -> ContentEvent {
        ContentEvent::Unshared {
            id: ContentId::new("c"),
        }
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_stop_delivery() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let set = ListenerSet::new().with_bus(bus);
        let first = RecordingListener::arc();
        let last = RecordingListener::arc();
        set.add(first.clone());
        set.add(Arc::new(PanickingListener));
        set.add(last.clone());

        assert_eq!(set.notify(&unshared()).await, 2);
        assert_eq!(first.events(), vec![unshared()]);
        assert_eq!(last.events(), vec![unshared()]);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ListenerPanicked);
    }

    #[tokio::test]
    async fn test_duplicate_add_and_identity_removal() {
        let set = ListenerSet::new();
        let a = RecordingListener::arc();
        let a_dyn: Arc<dyn ContentListener> = a.clone();
        assert!(set.add(a_dyn.clone()));
        assert!(!set.add(a_dyn.clone()));
        assert_eq!(set.len(), 1);

        let other: Arc<dyn ContentListener> = RecordingListener::arc();
        assert!(!set.remove(&other));
        assert!(set.remove(&a_dyn));
        assert!(set.is_empty());

        set.notify(&unshared()).await;
        assert!(a.events().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_during_pass_does_not_affect_it() {
        let set = Arc::new(ListenerSet::new());
        let late = RecordingListener::arc();
        let adder = RecordingListener::adding_on_event(Arc::clone(&set), late.clone());
        set.add(adder.clone());

        set.notify(&unshared()).await;
        assert_eq!(adder.events().len(), 1);
        assert!(late.events().is_empty());
        assert_eq!(set.len(), 2);

        set.notify(&unshared()).await;
        assert_eq!(late.events().len(), 1);
    }
}
