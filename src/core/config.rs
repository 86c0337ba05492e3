//! # Service configuration.
//!
//! Provides [`ServiceConfig`], the settings for one [`ContentService`](crate::ContentService).
//!
//! Config is used in three places:
//! 1. **Lifecycle**: every `init`/`start`/`stop` phase of a provider is bounded by `lifecycle_timeout`
//! 2. **Aggregation**: per-provider transfer children and find queries use `transfer_timeout`/`find_timeout`,
//!    per-provider share and unshare calls use `share_timeout`
//! 3. **Pool monitoring**: `monitor` carries the task monitor thresholds
//!
//! ## Sentinel values
//! - any timeout `= 0s` → no timeout (treated as `None` by the accessors)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::monitor::MonitorConfig;

/// Configuration for the content service.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `lifecycle_timeout`: Bound on a single provider lifecycle phase (`0s` = none)
/// - `transfer_timeout`: Bound on one provider's part of a transfer (`0s` = none)
/// - `find_timeout`: Bound on one provider's find-shares query (`0s` = none)
/// - `share_timeout`: Bound on one provider's share or unshare call (`0s` = none)
/// - `monitor`: Thresholds for slow-task warnings and the watchdog cadence
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Maximum duration of one provider `init`, `start` or `stop` call.
    ///
    /// A phase that exceeds it drives the provider to `Failed`.
    pub lifecycle_timeout: Duration,

    /// Maximum duration of one provider's retrieval within an aggregate transfer.
    ///
    /// A child that exceeds it counts as failed; the other children continue.
    pub transfer_timeout: Duration,

    /// Maximum duration of one provider's find-shares query.
    ///
    /// A query that exceeds it is cancelled; results already delivered stand.
    pub find_timeout: Duration,

    /// Maximum duration of one provider's `share` or `unshare` call.
    ///
    /// A call that exceeds it is aborted and counts as no shares / `false`.
    pub share_timeout: Duration,

    /// Task monitor thresholds for the shared executor.
    pub monitor: MonitorConfig,
}

impl ServiceConfig {
    /// Returns the lifecycle phase timeout as an `Option`.
    #[inline]
    pub fn lifecycle_timeout(&self) -> Option<Duration> {
        non_zero(self.lifecycle_timeout)
    }

    /// Returns the per-provider transfer timeout as an `Option`.
    #[inline]
    pub fn transfer_timeout(&self) -> Option<Duration> {
        non_zero(self.transfer_timeout)
    }

    /// Returns the per-provider find timeout as an `Option`.
    #[inline]
    pub fn find_timeout(&self) -> Option<Duration> {
        non_zero(self.find_timeout)
    }

    /// Returns the per-provider share/unshare timeout as an `Option`.
    #[inline]
    pub fn share_timeout(&self) -> Option<Duration> {
        non_zero(self.share_timeout)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

#[inline]
fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO { None } else { Some(d) }
}

impl Default for ServiceConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `lifecycle_timeout = 30s`
    /// - `transfer_timeout = 0s` (transfers run until they finish or are cancelled)
    /// - `find_timeout = 30s`
    /// - `share_timeout = 30s`
    /// - `monitor = MonitorConfig::default()` (2000 ms queue, 200 ms run, watchdog 1 s / 5 s)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            lifecycle_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::ZERO,
            find_timeout: Duration::from_secs(30),
            share_timeout: Duration::from_secs(30),
            monitor: MonitorConfig::default(),
        }
    }
}
