//! # Content listener contract.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use async_trait::async_trait;
//! use contentvisor::{ContentEvent, ContentListener};
//!
//! #[derive(Default)]
//! struct FoundCounter(AtomicUsize);
//!
//! #[async_trait]
//! impl ContentListener for FoundCounter {
//!     async fn on_event(&self, event: &ContentEvent) {
//!         if let ContentEvent::SharesFound { shares, .. } = event {
//!             self.0.fetch_add(shares.len(), Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::content::{ContentId, ContentShare};

/// Notification delivered to content listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentEvent {
    /// Content was shared; carries every share produced across providers.
    Shared { shares: Vec<ContentShare> },
    /// At least one provider stopped sharing `id`.
    Unshared { id: ContentId },
    /// A batch of find-shares results.
    ///
    /// `last` is set on exactly one event per query, after which nothing else
    /// is delivered for that query. The final batch may be empty.
    SharesFound { shares: Vec<ContentShare>, last: bool },
}

impl ContentEvent {
    pub fn as_label(&self) -> &'static str {
        match self {
            ContentEvent::Shared { .. } => "shared",
            ContentEvent::Unshared { .. } => "unshared",
            ContentEvent::SharesFound { .. } => "shares_found",
        }
    }
}

/// Observer of content events.
///
/// A panic inside `on_event` is caught by the delivering [`ListenerSet`](crate::ListenerSet);
/// remaining listeners still receive the event.
#[async_trait]
pub trait ContentListener: Send + Sync + 'static {
    async fn on_event(&self, event: &ContentEvent);

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
