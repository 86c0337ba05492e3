use std::fmt;
use std::sync::Arc;

/// Identity under which a module (the service itself or a provider) is registered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Module implementation advertisement.
///
/// Only the fields read for registration keying and diagnostic logging are modelled.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ModuleImplAdvertisement {
    /// Spec identifier this implementation fulfils.
    pub spec_id: Option<ModuleId>,
    /// Free-form description.
    pub description: Option<String>,
    /// Code locator (type name, entry point).
    pub code: Option<String>,
    /// URI of the implementation package.
    pub uri: Option<String>,
}

/// Advertisement a provider publishes about itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Advertisement {
    /// Module spec advertisement.
    ModuleSpec {
        /// Own advertisement identity.
        id: ModuleId,
        /// Module spec identity.
        spec_id: ModuleId,
    },
    /// Module implementation advertisement.
    ModuleImpl {
        /// Own advertisement identity.
        id: ModuleId,
        /// Implementation details.
        adv: ModuleImplAdvertisement,
    },
    /// Any other advertisement type; only its own identity is known.
    Other {
        /// Own advertisement identity.
        id: ModuleId,
    },
}

impl Advertisement {
    /// Identity of the advertisement document itself.
    pub fn id(&self) -> &ModuleId {
        match self {
            Advertisement::ModuleSpec { id, .. }
            | Advertisement::ModuleImpl { id, .. }
            | Advertisement::Other { id } => id,
        }
    }

    /// Identity used to register a provider with the lifecycle manager.
    ///
    /// Prefers the module spec identity, then the spec identity named by an
    /// implementation advertisement, then the advertisement's own identity.
    pub fn assigned_id(&self) -> ModuleId {
        match self {
            Advertisement::ModuleSpec { spec_id, .. } => spec_id.clone(),
            Advertisement::ModuleImpl { id, adv } => adv.spec_id.clone().unwrap_or_else(|| id.clone()),
            Advertisement::Other { id } => id.clone(),
        }
    }
}

/// Naming context of the peer group the service runs in (diagnostics only).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PeerGroupContext {
    pub group_name: String,
    pub group_id: String,
    pub peer_id: String,
}

impl PeerGroupContext {
    pub fn new(
        group_name: impl Into<String>,
        group_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            group_name: group_name.into(),
            group_id: group_id.into(),
            peer_id: peer_id.into(),
        }
    }
}
