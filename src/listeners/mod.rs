//! # Content listeners.
//!
//! [`ContentListener`]s observe what the service does with content: shares,
//! unshares and the incremental results of find-shares queries. They are held
//! in a copy-on-write [`ListenerSet`] so a notification pass is never disturbed
//! by concurrent registration or removal.
//!
//! Unlike bus [`Subscribe`](crate::Subscribe)rs, listeners are awaited in place:
//! a share/unshare call returns only after every listener has seen the event.

mod listener;
mod set;

pub use listener::{ContentEvent, ContentListener};
pub use set::ListenerSet;
