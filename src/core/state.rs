//! # Provider lifecycle state machine.
//!
//! ```text
//! Uninitialized ─► Initializing ─► Initialized ─► Starting ─► Started ─► Stopping ─► Stopped
//!                                                    ▲                                  │
//!                                                    └──────────────────────────────────┘
//!
//! any non-terminal state ─► Failed   (terminal)
//! ```
//!
//! The registry contains a provider exactly while it is [`LifecycleState::Started`].

/// Position of a provider in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Registered, `init` not yet called.
    Uninitialized,
    /// `init` running.
    Initializing,
    /// `init` succeeded; waiting for a start request.
    Initialized,
    /// `start` running.
    Starting,
    /// In service; visible in the registry.
    Started,
    /// `stop` running.
    Stopping,
    /// Out of service; may be started again.
    Stopped,
    /// A phase failed; no further transitions.
    Failed,
}

impl LifecycleState {
    /// Whether moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Uninitialized, Initializing)
            | (Initializing, Initialized)
            | (Initialized, Starting)
            | (Starting, Started)
            | (Started, Stopping)
            | (Stopping, Stopped)
            | (Stopped, Starting) => true,
            _ => false,
        }
    }

    /// True for [`LifecycleState::Failed`].
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Failed)
    }

    /// True while a phase call is in flight.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            LifecycleState::Initializing | LifecycleState::Starting | LifecycleState::Stopping
        )
    }

    /// Short snake_case label for logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        }
    }
}
