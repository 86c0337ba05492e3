//! # Fan-out / fan-in over registry snapshots.
//!
//! - [`TransferAggregator`] turns one retrieval into N provider attempts behind a
//!   single [`TransferHandle`]; the first success wins.
//! - [`EventAggregator`] runs one bounded find-shares query across providers and
//!   streams merged results to listeners through a [`FindHandle`].
//!
//! Both take the registry snapshot at call time and run every provider call on
//! the [`SharedExecutor`](crate::SharedExecutor), each under its own child
//! cancellation token and timeout.

mod find;
mod transfer;

pub use find::{EventAggregator, FindHandle};
pub use transfer::{ChildStatus, TransferAggregator, TransferHandle, TransferState};
