//! # Content data model and the advertisement boundary.
//!
//! Plain value types shared by providers, aggregators and the façade:
//! - [`ContentId`], [`Content`] the opaque key and payload;
//! - [`ShareAdvertisement`], [`ContentShare`] what `share` produces and `retrieve`/`find` consume;
//! - [`RetrieveTarget`] either of the two retrieval inputs;
//! - [`Advertisement`], [`ModuleImplAdvertisement`], [`ModuleId`], [`PeerGroupContext`]
//!   the narrow slice of the module/peer-group collaborators the service reads.
//!
//! Serialization of advertisements is handled elsewhere; here they are opaque values.

mod advertisement;
mod types;

pub use advertisement::{Advertisement, ModuleId, ModuleImplAdvertisement, PeerGroupContext};
pub use types::{Content, ContentId, ContentShare, RetrieveTarget, ShareAdvertisement};
