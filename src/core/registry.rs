//! # Live set of started providers.
//!
//! Maintains the set of providers whose lifecycle state is `Started`, driven
//! entirely by [`LifecycleListener`] callbacks from the provider actors.
//!
//! ## Architecture
//! ```text
//! ProviderActor ──► state_changed(p, Started)  ──► insert(p)
//!               ──► state_changed(p, other)    ──► remove(p)
//!                                                     │
//!                                                     ▼
//!                                    ArcSwap<Vec<Arc<dyn ManagedProvider>>>
//!                                                     │
//!                              snapshot() ◄───────────┘  (lock-free, point-in-time)
//! ```
//!
//! ## Rules
//! - Readers never block writers and vice versa: `snapshot()` is a single atomic load
//! - Writers are serialized by a small mutex and publish a fresh vector (copy-on-write)
//! - Insert is idempotent by pointer identity; removing an absent provider is a no-op
//! - A snapshot is immutable: later mutations never show up in it

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::core::{lifecycle::LifecycleListener, state::LifecycleState};
use crate::provider::{ManagedProvider, provider_key};

/// Point-in-time view of the registry.
pub type ProviderSnapshot = Arc<Vec<Arc<dyn ManagedProvider>>>;

/// Concurrently readable set of started providers.
pub struct ProviderRegistry {
    providers: ArcSwap<Vec<Arc<dyn ManagedProvider>>>,
    writer: Mutex<()>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Current contents. The returned vector never changes.
    pub fn snapshot(&self) -> ProviderSnapshot {
        self.providers.load_full()
    }

    pub fn contains(&self, provider: &Arc<dyn ManagedProvider>) -> bool {
        let key = provider_key(provider);
        self.providers.load().iter().any(|p| provider_key(p) == key)
    }

    pub fn len(&self) -> usize {
        self.providers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `provider` unless it is already present. Returns whether it was added.
    fn insert(&self, provider: &Arc<dyn ManagedProvider>) -> bool {
        let _w = self.writer.lock();
        let current = self.providers.load();
        let key = provider_key(provider);
        if current.iter().any(|p| provider_key(p) == key) {
            return false;
        }
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(provider));
        self.providers.store(Arc::new(next));
        true
    }

    /// Removes `provider` if present. Returns whether it was removed.
    fn remove(&self, provider: &Arc<dyn ManagedProvider>) -> bool {
        let _w = self.writer.lock();
        let current = self.providers.load();
        let key = provider_key(provider);
        if !current.iter().any(|p| provider_key(p) == key) {
            return false;
        }
        let next: Vec<_> = current
            .iter()
            .filter(|p| provider_key(*p) != key)
            .cloned()
            .collect();
        self.providers.store(Arc::new(next));
        true
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleListener for ProviderRegistry {
    fn state_changed(&self, provider: &Arc<dyn ManagedProvider>, state: LifecycleState) {
        let changed = if state == LifecycleState::Started {
            self.insert(provider)
        } else {
            self.remove(provider)
        };
        if changed {
            tracing::debug!(
                provider = provider.name(),
                state = state.as_label(),
                size = self.len(),
                "provider registry updated"
            );
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .providers
            .load()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("ProviderRegistry").field("providers", &names).finish()
    }
}
