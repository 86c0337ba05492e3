use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Opaque content key; equality and hash are by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Arc<str>);

impl ContentId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A piece of content: identifier plus an opaque payload.
///
/// The payload is [`Bytes`] so that fanning the same content out to several
/// providers never copies it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    id: ContentId,
    data: Bytes,
}

impl Content {
    pub fn new(id: impl Into<ContentId>, data: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }

    pub fn id(&self) -> &ContentId {
        &self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Advertisement describing one shared piece of content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShareAdvertisement {
    /// Content being advertised.
    pub content_id: ContentId,
    /// Human readable name, if the sharer supplied one.
    pub name: Option<Arc<str>>,
    /// Free-form description.
    pub description: Option<Arc<str>>,
}

impl ShareAdvertisement {
    pub fn new(content_id: impl Into<ContentId>) -> Self {
        Self {
            content_id: content_id.into(),
            name: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<Arc<str>>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A share produced by one provider: the advertisement plus who offers it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentShare {
    advertisement: ShareAdvertisement,
    provider: Arc<str>,
}

impl ContentShare {
    pub fn new(advertisement: ShareAdvertisement, provider: impl Into<Arc<str>>) -> Self {
        Self {
            advertisement,
            provider: provider.into(),
        }
    }

    pub fn advertisement(&self) -> &ShareAdvertisement {
        &self.advertisement
    }

    pub fn content_id(&self) -> &ContentId {
        &self.advertisement.content_id
    }

    /// Name of the provider offering this share.
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// What a retrieval is asked to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetrieveTarget {
    /// Retrieve by bare identifier; providers locate the content themselves.
    Id(ContentId),
    /// Retrieve using a share advertisement obtained from `share` or `find`.
    Share(ShareAdvertisement),
}

impl RetrieveTarget {
    pub fn content_id(&self) -> &ContentId {
        match self {
            RetrieveTarget::Id(id) => id,
            RetrieveTarget::Share(adv) => &adv.content_id,
        }
    }
}

impl From<ContentId> for RetrieveTarget {
    fn from(id: ContentId) -> Self {
        RetrieveTarget::Id(id)
    }
}

impl From<&str> for RetrieveTarget {
    fn from(id: &str) -> Self {
        RetrieveTarget::Id(ContentId::from(id))
    }
}

impl From<ShareAdvertisement> for RetrieveTarget {
    fn from(adv: ShareAdvertisement) -> Self {
        RetrieveTarget::Share(adv)
    }
}
