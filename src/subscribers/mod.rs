//! # Event subscribers for runtime diagnostics.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! used by the service to deliver bus [`Event`](crate::Event)s to observers.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ProviderActor ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit
//!                                                                        │
//!                                                              ┌─────────┼─────────┐
//!                                                              ▼         ▼         ▼
//!                                                          LogWriter  Metrics   Custom
//! ```
//!
//! Subscribers are for observability. Content listeners (share/unshare/find
//! notifications) live in [`crate::listeners`] and have stronger ordering rules.

mod embedded;
mod subscribe;
mod subscriber_set;

#[cfg_attr(not(feature = "logging"), allow(unused_imports))]
pub use embedded::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
