//! # Provider discovery from a manifest of type names.
//!
//! [`ProviderFactoryRegistry`] maps provider type names to constructors registered
//! at process start. A manifest lists one type name per line:
//!
//! ```text
//! # transports enabled on this peer
//! http-provider
//! swarm-provider   # trailing comments are fine
//! ```
//!
//! ## Rules
//! - Everything after `#` is ignored, lines are trimmed, blank lines are skipped.
//! - An unknown name or a failing (or panicking) constructor is logged and skipped;
//!   discovery always continues with the next line.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::{ProviderError, panic_message};
use crate::provider::ManagedProvider;

/// Constructor producing a fresh provider instance.
pub type ProviderConstructor =
    Arc<dyn Fn() -> Result<Arc<dyn ManagedProvider>, ProviderError> + Send + Sync>;

/// Registry of named provider constructors.
#[derive(Default, Clone)]
pub struct ProviderFactoryRegistry {
    factories: HashMap<String, ProviderConstructor>,
}

impl ProviderFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn ManagedProvider>, ProviderError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(ctor));
        self
    }

    /// Sorted list of registered type names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Instantiates every provider named in `manifest`, in manifest order.
    pub fn locate(&self, manifest: &str) -> Vec<Arc<dyn ManagedProvider>> {
        let mut found = Vec::new();
        for line in manifest.lines() {
            let name = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            }
            .trim();
            if name.is_empty() {
                continue;
            }
            if let Some(provider) = self.instantiate(name) {
                tracing::debug!(provider = name, "content provider located");
                found.push(provider);
            }
        }
        found
    }

    /// Runs [`locate`](Self::locate) over several manifests and concatenates the results.
    pub fn locate_all<'a, I>(&self, manifests: I) -> Vec<Arc<dyn ManagedProvider>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        manifests
            .into_iter()
            .flat_map(|manifest| self.locate(manifest))
            .collect()
    }

    fn instantiate(&self, name: &str) -> Option<Arc<dyn ManagedProvider>> {
        let Some(ctor) = self.factories.get(name) else {
            tracing::error!(provider = name, "could not load content provider: unknown type");
            return None;
        };
        match std::panic::catch_unwind(AssertUnwindSafe(|| ctor())) {
            Ok(Ok(provider)) => Some(provider),
            Ok(Err(e)) => {
                tracing::error!(provider = name, error = %e, "could not instantiate content provider");
                None
            }
            Err(panic) => {
                tracing::error!(
                    provider = name,
                    panic = %panic_message(panic.as_ref()),
                    "content provider constructor panicked"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for ProviderFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactoryRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryProvider;

    fn registry() -> ProviderFactoryRegistry {
        let mut reg = ProviderFactoryRegistry::new();
        reg.register("memory", || Ok(MemoryProvider::arc("memory") as Arc<dyn ManagedProvider>))
            .register("broken", || Err(ProviderError::failed("missing native library")))
            .register("panicky", || panic!("constructor exploded"));
        reg
    }

    #[test]
    fn test_locate_skips_comments_and_blank_lines() {
        let manifest = "# header\n\n   memory   # inline comment\n#memory\n   \n";
        let found = registry().locate(manifest);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "memory");
    }

    #[test]
    fn test_locate_continues_after_failures() {
        let manifest = "unknown\nbroken\npanicky\nmemory\nmemory\n";
        let found = registry().locate(manifest);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.name() == "memory"));
    }

    #[test]
    fn test_locate_all_concatenates() {
        let found = registry().locate_all(["memory", "broken\nmemory"]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_names_sorted() {
        assert_eq!(registry().names(), vec!["broken", "memory", "panicky"]);
    }
}
