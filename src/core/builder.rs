use std::sync::Arc;

use crate::{
    core::{config::ServiceConfig, service::ContentService},
    events::Bus,
    provider::{ManagedProvider, ProviderFactoryRegistry},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`ContentService`] with optional features.
pub struct ContentServiceBuilder {
    cfg: ServiceConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    providers: Vec<Arc<dyn ManagedProvider>>,
}

impl ContentServiceBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ServiceConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (provider lifecycle, transfers, slow tasks)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Queues providers for registration at `init`.
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ManagedProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Queues every provider the factory registry resolves from `manifests`.
    ///
    /// Unknown or failing entries are skipped by the registry.
    pub fn with_discovery<'a, I>(mut self, factories: &ProviderFactoryRegistry, manifests: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let found = factories.locate_all(manifests);
        tracing::debug!(providers = found.len(), "providers discovered");
        self.providers.extend(found);
        self
    }

    /// Builds and returns the service.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// - Event bus for diagnostics
    /// - Subscriber workers
    /// - Monitored executor, lifecycle manager and registry
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<ContentService> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        ContentService::new_internal(self.cfg, bus, subs, self.providers)
    }
}
