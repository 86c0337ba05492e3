//! # Watchdog: periodic "still running?" probe for one monitored task.
//!
//! Spawned when a monitored task starts executing; probes after
//! `watchdog_delay` and then every `watchdog_period`, logging the worker thread the
//! task started on and how long it has been running.
//!
//! The returned [`Watchdog`] is a scope guard: dropping it cancels the probe task
//! and releases the `active_watchdogs` gauge immediately.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::events::EventKind;
use crate::monitor::task_monitor::Timing;

pub(crate) struct Watchdog {
    timing: Timing,
    _cancel: DropGuard,
}

impl Watchdog {
    pub(crate) fn spawn(timing: Timing, started: Instant) -> Self {
        let token = CancellationToken::new();
        timing.stats.active_watchdogs.fetch_add(1, Ordering::SeqCst);

        let thread = std::thread::current()
            .name()
            .map(Arc::<str>::from)
            .unwrap_or_else(|| Arc::from("<unnamed>"));

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run(timing.clone(), token.clone(), started, thread));
            }
            Err(_) => {
                tracing::debug!(task = %timing.label, "no runtime available; watchdog disabled");
            }
        }

        Self {
            timing,
            _cancel: token.drop_guard(),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.timing.stats.active_watchdogs.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run(timing: Timing, token: CancellationToken, started: Instant, thread: Arc<str>) {
    let first = tokio::time::Instant::from_std(started) + timing.cfg.watchdog_delay;
    // interval_at panics on a zero period.
    let period = timing.cfg.watchdog_period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(first, period);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let elapsed = started.elapsed();
                timing.stats.watchdog_probes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    task = %timing.label,
                    thread = %thread,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "task still running in the shared executor"
                );
                timing.publish(EventKind::WatchdogProbe, elapsed);
            }
        }
    }
}
