//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime diagnostics emitted by the service, the
//! lifecycle manager, provider actors, aggregators and the task monitor.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ContentService`, `LifecycleManager`, `ProviderActor`,
//!   `TransferAggregator`, `EventAggregator`, `TaskMonitor`, `ListenerSet`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the service's subscriber listener (fans out to `SubscriberSet`).
//!
//! Bus events are diagnostics only. Registry membership never depends on them;
//! it follows the lifecycle manager's direct `LifecycleListener` callbacks.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
