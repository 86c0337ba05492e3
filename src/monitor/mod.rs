//! # Task monitor: queue latency, execution time and a concurrent watchdog.
//!
//! ```text
//! SharedExecutor::spawn(label, work)
//!     └─► TaskMonitor { scheduled_at = now }
//!             │  ... waits in the pool queue ...
//!             ▼
//!         begin(): started_at = now
//!             ├─ queue latency > queue_warn  ─► warn + TaskQueuedTooLong
//!             └─ Watchdog::spawn (delay, period) ─► periodic probe ─► warn + WatchdogProbe
//!         work runs
//!         Watchdog dropped (success, error, panic or cancellation)
//!         finish(): run time > run_warn ─► warn + TaskRanTooLong
//! ```
//!
//! The monitor never changes what the wrapped work returns.

mod executor;
mod task_monitor;
mod watchdog;

pub use executor::SharedExecutor;
pub use task_monitor::{MonitorConfig, MonitorStats, TaskMonitor};
