//! Runtime core: service façade, provider lifecycle and the started-provider registry.
//!
//! The public entry point is [`ContentService`], built with [`ContentServiceBuilder`].
//! [`LifecycleManager`] and [`ProviderRegistry`] are public so they can be driven
//! directly by embedders that do not need the façade.
//!
//! Internal modules:
//! - [`runner`]: runs one lifecycle phase with timeout, cancellation and panic capture;
//! - [`actor`]: serializes the phases of a single provider;
//! - [`lifecycle`]: owns provider records and drives actors toward the service phase;
//! - [`registry`]: copy-on-write set of providers in the `Started` state;
//! - [`service`]: the façade aggregating providers for content operations.

mod actor;
mod builder;
mod config;
mod lifecycle;
mod registry;
mod runner;
mod service;
mod state;

pub use builder::ContentServiceBuilder;
pub use config::ServiceConfig;
pub use lifecycle::{LifecycleListener, LifecycleManager, ProviderRecord};
pub use registry::{ProviderRegistry, ProviderSnapshot};
pub use service::{ContentService, StartStatus};
pub use state::LifecycleState;
