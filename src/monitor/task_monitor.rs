//! # TaskMonitor: decorator for one unit of pool work.
//!
//! Records when the work was scheduled and when it began executing, runs a
//! [`Watchdog`] alongside it, and reports slow queueing or slow execution.
//!
//! ## Rules
//! - Thresholds come from [`MonitorConfig`]; defaults are 2000 ms queue, 200 ms run,
//!   watchdog after 1 s then every 5 s.
//! - The watchdog lives exactly as long as the wrapped work; it is released by a
//!   scope guard, so panics and dropped futures release it too.
//! - Equality and hashing delegate to the wrapped work (dedup of diagnostic reports).

use std::future::IntoFuture;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::events::{Bus, Event, EventKind};
use crate::monitor::watchdog::Watchdog;

/// Thresholds and watchdog cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Queue latency above which a warning is logged.
    pub queue_warn: Duration,
    /// Execution time above which a warning is logged.
    pub run_warn: Duration,
    /// Delay before the first watchdog probe.
    pub watchdog_delay: Duration,
    /// Period between watchdog probes.
    pub watchdog_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_warn: Duration::from_millis(2000),
            run_warn: Duration::from_millis(200),
            watchdog_delay: Duration::from_secs(1),
            watchdog_period: Duration::from_secs(5),
        }
    }
}

/// Counters shared by every monitor created from one executor.
#[derive(Debug, Default)]
pub struct MonitorStats {
    pub(crate) slow_queue: AtomicU64,
    pub(crate) slow_run: AtomicU64,
    pub(crate) watchdog_probes: AtomicU64,
    pub(crate) active_watchdogs: AtomicUsize,
    pub(crate) completed: AtomicU64,
}

impl MonitorStats {
    /// Tasks that waited longer than `queue_warn`.
    pub fn slow_queue(&self) -> u64 {
        self.slow_queue.load(Ordering::Relaxed)
    }

    /// Tasks that ran longer than `run_warn`.
    pub fn slow_run(&self) -> u64 {
        self.slow_run.load(Ordering::Relaxed)
    }

    /// Watchdog probes fired so far.
    pub fn watchdog_probes(&self) -> u64 {
        self.watchdog_probes.load(Ordering::Relaxed)
    }

    /// Watchdogs currently scheduled.
    pub fn active_watchdogs(&self) -> usize {
        self.active_watchdogs.load(Ordering::SeqCst)
    }

    /// Tasks that ran to completion (without panicking or being dropped).
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Everything about a monitored task except the work itself.
#[derive(Clone)]
pub(crate) struct Timing {
    pub(crate) label: Arc<str>,
    pub(crate) scheduled_at: Instant,
    pub(crate) cfg: MonitorConfig,
    pub(crate) stats: Arc<MonitorStats>,
    pub(crate) bus: Option<Bus>,
}

impl Timing {
    /// Marks the start of execution: checks queue latency and arms the watchdog.
    fn begin(&self) -> (Instant, Watchdog) {
        let started = Instant::now();
        let queued = started.saturating_duration_since(self.scheduled_at);
        if queued > self.cfg.queue_warn {
            self.stats.slow_queue.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                task = %self.label,
                queued_ms = queued.as_millis() as u64,
                "task queued too long"
            );
            self.publish(EventKind::TaskQueuedTooLong, queued);
        }
        let watchdog = Watchdog::spawn(self.clone(), started);
        (started, watchdog)
    }

    fn finish(&self, started: Instant) {
        let elapsed = started.elapsed();
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        if elapsed > self.cfg.run_warn {
            self.stats.slow_run.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                task = %self.label,
                elapsed_ms = elapsed.as_millis() as u64,
                "task took too long to complete in the shared executor"
            );
            self.publish(EventKind::TaskRanTooLong, elapsed);
        }
    }

    pub(crate) fn publish(&self, kind: EventKind, elapsed: Duration) {
        if let Some(bus) = &self.bus {
            bus.publish(
                Event::new(kind)
                    .with_reason(Arc::clone(&self.label))
                    .with_elapsed(elapsed),
            );
        }
    }
}

/// Wraps one unit of work (a future or a blocking closure) with timing diagnostics.
pub struct TaskMonitor<W> {
    work: W,
    timing: Timing,
}

impl<W> TaskMonitor<W> {
    /// Wraps `work`; the scheduling timestamp is taken now.
    pub fn new(
        label: impl Into<Arc<str>>,
        work: W,
        cfg: MonitorConfig,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            work,
            timing: Timing {
                label: label.into(),
                scheduled_at: Instant::now(),
                cfg,
                stats,
                bus: None,
            },
        }
    }

    /// Also publishes diagnostics on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.timing.bus = Some(bus);
        self
    }

    pub fn label(&self) -> &str {
        &self.timing.label
    }

    pub fn scheduled_at(&self) -> Instant {
        self.timing.scheduled_at
    }

    /// The wrapped unit of work.
    pub fn work(&self) -> &W {
        &self.work
    }
}

impl<W> TaskMonitor<W>
where
    W: IntoFuture,
{
    /// Runs the wrapped future to completion under monitoring.
    pub async fn run(self) -> W::Output {
        let Self { work, timing } = self;
        let (started, watchdog) = timing.begin();
        let out = work.into_future().await;
        drop(watchdog);
        timing.finish(started);
        out
    }
}

impl<W, T> TaskMonitor<W>
where
    W: FnOnce() -> T,
{
    /// Runs the wrapped closure on the current thread under monitoring.
    ///
    /// Intended for blocking pool threads; the watchdog is spawned on the ambient
    /// tokio runtime if there is one.
    pub fn call(self) -> T {
        let Self { work, timing } = self;
        let (started, watchdog) = timing.begin();
        let out = work();
        drop(watchdog);
        timing.finish(started);
        out
    }
}

impl<W: PartialEq> PartialEq for TaskMonitor<W> {
    fn eq(&self, other: &Self) -> bool {
        self.work == other.work
    }
}

impl<W: Eq> Eq for TaskMonitor<W> {}

impl<W: Hash> Hash for TaskMonitor<W> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.work.hash(state);
    }
}

impl<W> std::fmt::Debug for TaskMonitor<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskMonitor")
            .field("label", &self.timing.label)
            .field("scheduled_at", &self.timing.scheduled_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test_support::WarnCapture;

    fn fast_watchdog() -> MonitorConfig {
        MonitorConfig {
            watchdog_delay: Duration::from_millis(20),
            watchdog_period: Duration::from_millis(20),
            ..MonitorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_slow_task_warns_exactly_once_and_releases_watchdog() {
        let (logs, _guard) = WarnCapture::install();
        let stats = Arc::new(MonitorStats::default());
        let monitor = TaskMonitor::new(
            "sleepy",
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                42
            },
            MonitorConfig::default(),
            stats.clone(),
        );

        assert_eq!(monitor.run().await, 42);
        assert_eq!(
            logs.count("task took too long to complete in the shared executor"),
            1,
            "warnings: {:?}",
            logs.messages()
        );
        assert_eq!(stats.slow_run(), 1);
        assert_eq!(stats.slow_queue(), 0);
        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.active_watchdogs(), 0);
    }

    #[tokio::test]
    async fn test_fast_task_does_not_warn() {
        let (logs, _guard) = WarnCapture::install();
        let stats = Arc::new(MonitorStats::default());
        let out = TaskMonitor::new("quick", async { "ok" }, MonitorConfig::default(), stats.clone())
            .run()
            .await;
        assert_eq!(out, "ok");
        assert!(logs.messages().is_empty());
        assert_eq!(stats.slow_run(), 0);
        assert_eq!(stats.completed(), 1);
    }

    #[tokio::test]
    async fn test_queue_latency_is_reported() {
        let stats = Arc::new(MonitorStats::default());
        let cfg = MonitorConfig {
            queue_warn: Duration::from_millis(10),
            ..MonitorConfig::default()
        };
        let monitor = TaskMonitor::new("queued", async {}, cfg, stats.clone());
        tokio::time::sleep(Duration::from_millis(40)).await;
        monitor.run().await;
        assert_eq!(stats.slow_queue(), 1);
    }

    #[tokio::test]
    async fn test_watchdog_probes_while_running_and_stops_after() {
        let stats = Arc::new(MonitorStats::default());
        TaskMonitor::new(
            "long",
            tokio::time::sleep(Duration::from_millis(150)),
            fast_watchdog(),
            stats.clone(),
        )
        .run()
        .await;

        let probes = stats.watchdog_probes();
        assert!(probes >= 2, "expected periodic probes, got {probes}");
        assert_eq!(stats.active_watchdogs(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(stats.watchdog_probes(), probes);
    }

    #[tokio::test]
    async fn test_watchdog_released_when_work_panics() {
        let stats = Arc::new(MonitorStats::default());
        let monitor = TaskMonitor::new(
            "boom",
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                panic!("work exploded");
            },
            fast_watchdog(),
            stats.clone(),
        );
        let joined = tokio::spawn(monitor.run()).await;
        assert!(joined.is_err());
        assert_eq!(stats.active_watchdogs(), 0);
        assert_eq!(stats.completed(), 0);
    }

    #[tokio::test]
    async fn test_watchdog_released_when_future_dropped() {
        let stats = Arc::new(MonitorStats::default());
        let monitor = TaskMonitor::new(
            "abandoned",
            tokio::time::sleep(Duration::from_secs(30)),
            fast_watchdog(),
            stats.clone(),
        );
        let res = tokio::time::timeout(Duration::from_millis(30), monitor.run()).await;
        assert!(res.is_err());
        assert_eq!(stats.active_watchdogs(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_call_is_monitored() {
        let stats = Arc::new(MonitorStats::default());
        let monitor = TaskMonitor::new(
            "blocking",
            || {
                std::thread::sleep(Duration::from_millis(250));
                7
            },
            MonitorConfig::default(),
            stats.clone(),
        );
        let out = tokio::task::spawn_blocking(move || monitor.call()).await.unwrap();
        assert_eq!(out, 7);
        assert_eq!(stats.slow_run(), 1);
        assert_eq!(stats.active_watchdogs(), 0);
    }

    #[test]
    fn test_equality_follows_wrapped_work() {
        let stats = Arc::new(MonitorStats::default());
        let cfg = MonitorConfig::default();
        let a = TaskMonitor::new("a", "work-1", cfg, stats.clone());
        let b = TaskMonitor::new("b", "work-1", cfg, stats.clone());
        let c = TaskMonitor::new("a", "work-2", cfg, stats);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut seen = HashSet::new();
        assert!(seen.insert(a));
        assert!(!seen.insert(b));
        assert!(seen.insert(c));
    }
}
