//! # Provider traits.
//!
//! A provider is a pluggable backend capable of some subset of
//! {retrieve, share, unshare, find shares}. Every capability has a default body
//! returning [`ProviderError::Unsupported`], so an implementation only writes the
//! operations it actually offers and reports them through [`ContentProvider::supports`].
//!
//! A provider that should be supervised by the service additionally implements
//! [`ManagedProvider`] and overrides [`ContentProvider::as_managed`] to return itself.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use contentvisor::{
//!     Advertisement, Content, ContentProvider, ContentShare, ManagedProvider, Operation,
//!     ProviderError, ShareAdvertisement,
//! };
//!
//! struct Announce;
//!
//! #[async_trait]
//! impl ContentProvider for Announce {
//!     fn name(&self) -> &str { "announce" }
//!
//!     fn supports(&self, op: Operation) -> bool { op == Operation::Share }
//!
//!     async fn share(&self, content: &Content) -> Result<Vec<ContentShare>, ProviderError> {
//!         let adv = ShareAdvertisement::new(content.id().clone());
//!         Ok(vec![ContentShare::new(adv, self.name())])
//!     }
//!
//!     fn as_managed(self: Arc<Self>) -> Option<Arc<dyn ManagedProvider>> { Some(self) }
//! }
//!
//! #[async_trait]
//! impl ManagedProvider for Announce {
//!     fn advertisement(&self) -> Advertisement {
//!         Advertisement::Other { id: "announce".into() }
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::content::{
    Advertisement, Content, ContentId, ContentShare, ModuleId, PeerGroupContext, RetrieveTarget,
};
use crate::error::ProviderError;

/// Future produced by an accepted retrieval; resolves to the fetched content.
pub type BoxTransferFuture = Pin<Box<dyn Future<Output = Result<Content, ProviderError>> + Send>>;

/// Stream of share batches produced by a find query.
pub type ShareStream = BoxStream<'static, Vec<ContentShare>>;

/// Capabilities a provider may offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Retrieve,
    Share,
    Unshare,
    FindShares,
}

/// Public capability surface of a provider.
#[async_trait]
pub trait ContentProvider: Send + Sync + 'static {
    /// Stable, human-readable provider name (also stamped on produced shares).
    fn name(&self) -> &str;

    /// Whether the provider implements `op`.
    fn supports(&self, op: Operation) -> bool;

    /// Begins a retrieval.
    ///
    /// Returning `Err` rejects the request synchronously; returning a future accepts
    /// it. The future should observe `ctx` and return [`ProviderError::Canceled`]
    /// promptly once it is cancelled.
    fn retrieve(
        &self,
        target: &RetrieveTarget,
        ctx: CancellationToken,
    ) -> Result<BoxTransferFuture, ProviderError> {
        let _ = (target, ctx);
        Err(ProviderError::Unsupported {
            op: Operation::Retrieve,
        })
    }

    /// Shares `content`, returning the shares this provider now offers.
    ///
    /// An empty vector means "nothing shared by me".
    async fn share(&self, content: &Content) -> Result<Vec<ContentShare>, ProviderError> {
        let _ = content;
        Err(ProviderError::Unsupported { op: Operation::Share })
    }

    /// Stops sharing `id`. Returns `true` if this provider was sharing it.
    async fn unshare(&self, id: &ContentId) -> Result<bool, ProviderError> {
        let _ = id;
        Err(ProviderError::Unsupported {
            op: Operation::Unshare,
        })
    }

    /// Starts a query for up to `max` shares, yielding batches as they are discovered.
    ///
    /// The stream ends when the provider has nothing more to report. `ctx` is
    /// cancelled when the caller no longer needs results.
    fn find_shares(&self, max: usize, ctx: CancellationToken) -> Result<ShareStream, ProviderError> {
        let _ = (max, ctx);
        Err(ProviderError::Unsupported {
            op: Operation::FindShares,
        })
    }

    /// Returns the privileged lifecycle surface, if this provider exposes one.
    fn as_managed(self: Arc<Self>) -> Option<Arc<dyn ManagedProvider>> {
        None
    }
}

/// Everything a provider learns when it is initialized.
#[derive(Clone, Debug)]
pub struct ProviderContext {
    /// Peer group the service runs in.
    pub group: PeerGroupContext,
    /// Identity the provider was registered under.
    pub assigned_id: ModuleId,
    /// The provider's own advertisement.
    pub advertisement: Advertisement,
}

/// Privileged lifecycle surface driven by the lifecycle manager.
///
/// All phases default to a successful no-op.
#[async_trait]
pub trait ManagedProvider: ContentProvider {
    /// Advertisement describing this provider implementation.
    fn advertisement(&self) -> Advertisement;

    /// One-time initialization.
    async fn init(&self, ctx: &ProviderContext) -> Result<(), ProviderError> {
        let _ = ctx;
        Ok(())
    }

    /// Brings the provider into service.
    async fn start(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Takes the provider out of service; `ctx` is cancelled on a forced removal.
    async fn stop(&self, ctx: CancellationToken) -> Result<(), ProviderError> {
        let _ = ctx;
        Ok(())
    }
}

/// Identity of a provider instance, independent of which trait object it is viewed through.
pub(crate) fn provider_key<T: ?Sized>(provider: &Arc<T>) -> usize {
    Arc::as_ptr(provider) as *const () as usize
}
