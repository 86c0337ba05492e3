//! # contentvisor
//!
//! **Contentvisor** is a pluggable content-distribution service for Rust.
//!
//! It supervises a set of provider backends (transports, swarms, HTTP mirrors)
//! through an init/start/stop lifecycle and aggregates their capabilities behind
//! a single façade: retrieve content from whichever provider delivers first,
//! share and unshare through all of them, and discover shares across all of them
//! under a global cap.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Provider A  │   │  Provider B  │   │  Provider C  │
//!     │ (managed)    │   │ (managed)    │   │ (managed)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ContentService (façade)                                          │
//! │  - LifecycleManager (one ProviderActor per provider)              │
//! │  - ProviderRegistry (copy-on-write set of Started providers)      │
//! │  - ListenerSet (share / unshare notifications)                    │
//! │  - TransferAggregator / EventAggregator (fan-out + merge)         │
//! │  - SharedExecutor (monitored pool for every provider call)        │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ProviderActor │   │ProviderActor │   │ProviderActor │   │
//!     │(phase queue) │   │(phase queue) │   │(phase queue) │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ state_changed    │                  │                 │
//!      ├────────────────► ProviderRegistry ◄─┘                 │
//!      │                                                       │
//!      │ Publishes: ProviderStateChanged, ProviderFailed,      │
//!      │ TransferFinished, TaskRanTooLong, ...                 │
//!      ▼                                                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │               (capacity: ServiceConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                      worker1   worker2   workerN
//! ```
//!
//! ### Provider lifecycle
//! ```text
//! Uninitialized ─► Initializing ─► Initialized ─► Starting ─► Started
//!                                                   ▲            │
//!                                                   │            ▼
//!                                                Stopped ◄── Stopping
//!
//! any phase error / panic / timeout ─► Failed (terminal)
//! ```
//!
//! ### Retrieval
//! ```text
//! retrieve_content(id)
//!   ├─ provider A ── accepted ── child transfer ──┐
//!   ├─ provider B ── rejected (skipped)           ├─► first success wins, siblings cancelled
//!   └─ provider C ── accepted ── child transfer ──┘   all failed ─► TransferError::AllFailed
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Providers**     | Pluggable backends with capability queries and a lifecycle.   | [`ContentProvider`], [`ManagedProvider`]        |
//! | **Discovery**     | Instantiate providers from a manifest of type names.          | [`ProviderFactoryRegistry`]                     |
//! | **Service**       | Façade for retrieve / share / unshare / find.                 | [`ContentService`], [`ContentServiceBuilder`]   |
//! | **Lifecycle**     | Per-provider actors, state machine, started registry.         | [`LifecycleManager`], [`ProviderRegistry`]      |
//! | **Aggregation**   | First-success transfers and capped share discovery.           | [`TransferHandle`], [`FindHandle`]              |
//! | **Listeners**     | Ordered, panic-isolated content notifications.                | [`ContentListener`], [`ListenerSet`]            |
//! | **Monitoring**    | Queue/run-time watchdogs for every provider call.             | [`SharedExecutor`], [`TaskMonitor`]             |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom).          | [`Subscribe`], [`Event`]                        |
//! | **Errors**        | Typed errors at each boundary.                                | [`ServiceError`], [`ProviderError`], [`TransferError`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use contentvisor::{ContentService, ModuleId, ModuleImplAdvertisement, PeerGroupContext, ServiceConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn contentvisor::Subscribe>> = {
//!         use contentvisor::LogWriter;
//!         vec![Arc::new(LogWriter::default())]
//!     };
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn contentvisor::Subscribe>> = Vec::new();
//!
//!     let service = ContentService::builder(ServiceConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     service.init(
//!         PeerGroupContext::new("net", "urn:group", "urn:peer"),
//!         ModuleId::new("content"),
//!         ModuleImplAdvertisement::default(),
//!     );
//!     service.start();
//!
//!     // no providers registered: nothing can serve this
//!     assert!(service.retrieve_content("missing").is_none());
//!     service.shutdown().await;
//! }
//! ```
mod aggregate;
mod content;
mod core;
mod error;
mod events;
mod listeners;
mod monitor;
mod provider;
mod subscribers;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use aggregate::{
    ChildStatus, EventAggregator, FindHandle, TransferAggregator, TransferHandle, TransferState,
};
pub use content::{
    Advertisement, Content, ContentId, ContentShare, ModuleId, ModuleImplAdvertisement,
    PeerGroupContext, RetrieveTarget, ShareAdvertisement,
};
pub use core::{
    ContentService, ContentServiceBuilder, LifecycleListener, LifecycleManager, LifecycleState,
    ProviderRecord, ProviderRegistry, ProviderSnapshot, ServiceConfig, StartStatus,
};
pub use error::{ProviderError, ServiceError, TransferError};
pub use events::{Bus, Event, EventKind};
pub use listeners::{ContentEvent, ContentListener, ListenerSet};
pub use monitor::{MonitorConfig, MonitorStats, SharedExecutor, TaskMonitor};
pub use provider::{
    BoxTransferFuture, ContentProvider, ManagedProvider, Operation, ProviderConstructor,
    ProviderContext, ProviderFactoryRegistry, ShareStream,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
