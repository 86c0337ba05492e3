//! # Provider abstractions and discovery.
//!
//! - [`ContentProvider`] the public capability surface (retrieve / share / unshare / find)
//!   plus the [`Operation`] capability query.
//! - [`ManagedProvider`] the privileged lifecycle surface (init / start / stop) that only
//!   the service drives.
//! - [`ProviderFactoryRegistry`] resolves a manifest of provider type names into instances.
//!
//! Missing capabilities are a normal branch: callers ask [`ContentProvider::supports`]
//! once per call and skip, and a stray [`ProviderError::Unsupported`](crate::ProviderError)
//! is treated the same way.

mod factory;
mod provider;

pub use factory::{ProviderConstructor, ProviderFactoryRegistry};
pub use provider::{
    BoxTransferFuture, ContentProvider, ManagedProvider, Operation, ProviderContext, ShareStream,
};

pub(crate) use provider::provider_key;
