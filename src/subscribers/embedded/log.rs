//! # LogWriter: renders events through `tracing`
//!
//! A minimal subscriber that logs every incoming [`Event`] with structured fields.
//! Faults go out at `warn`, lifecycle and content events at `info`/`debug`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  provider="http" state=Started provider state changed
//! WARN  provider="swarm" reason="bind failed" provider failed
//! WARN  task="transfer:http" elapsed_ms=412 task ran too long
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let provider = e.provider.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ProviderAdded => {
                tracing::info!(provider, id = reason, "provider added");
            }
            EventKind::ProviderStateChanged => {
                tracing::info!(provider, state = ?e.state, "provider state changed");
            }
            EventKind::ProviderFailed => {
                tracing::warn!(provider, reason, "provider failed");
            }
            EventKind::ProviderRemoved => {
                tracing::info!(provider, "provider removed");
            }
            EventKind::ServiceInitialized => {
                tracing::info!(pending = ?e.count, "content service initialized");
            }
            EventKind::ServiceStarted => tracing::info!("content service started"),
            EventKind::ServiceStopped => tracing::info!("content service stopped"),
            EventKind::ContentShared => {
                tracing::debug!(content = ?e.content, shares = ?e.count, "content shared");
            }
            EventKind::ContentUnshared => {
                tracing::debug!(content = ?e.content, "content unshared");
            }
            EventKind::TransferFinished => {
                tracing::debug!(content = ?e.content, outcome = reason, "transfer finished");
            }
            EventKind::FindFinished => {
                tracing::debug!(delivered = ?e.count, "find finished");
            }
            EventKind::TaskQueuedTooLong => {
                tracing::warn!(task = reason, elapsed_ms = ?e.elapsed_ms, "task queued too long");
            }
            EventKind::TaskRanTooLong => {
                tracing::warn!(task = reason, elapsed_ms = ?e.elapsed_ms, "task ran too long");
            }
            EventKind::WatchdogProbe => {
                tracing::warn!(task = reason, elapsed_ms = ?e.elapsed_ms, "task still running");
            }
            EventKind::ListenerPanicked => {
                tracing::warn!(listener = provider, reason, "listener panicked");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = provider, reason, "subscriber panicked");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = provider, reason, "subscriber overflow");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
