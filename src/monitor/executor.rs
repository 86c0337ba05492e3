//! # SharedExecutor: the monitored worker pool.
//!
//! A cheap-to-clone front for the ambient tokio runtime. Everything the service
//! runs on the pool (lifecycle phases, transfer children, find queries) goes
//! through [`SharedExecutor::spawn`], so every unit of work is wrapped in a
//! [`TaskMonitor`] that shares one [`MonitorStats`].

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::events::Bus;
use crate::monitor::{MonitorConfig, MonitorStats, TaskMonitor};

/// Spawns monitored work onto the current tokio runtime.
#[derive(Clone)]
pub struct SharedExecutor {
    cfg: MonitorConfig,
    stats: Arc<MonitorStats>,
    bus: Option<Bus>,
}

impl SharedExecutor {
    pub fn new(cfg: MonitorConfig) -> Self {
        Self {
            cfg,
            stats: Arc::new(MonitorStats::default()),
            bus: None,
        }
    }

    /// Also publishes monitor diagnostics on `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> MonitorConfig {
        self.cfg
    }

    /// Counters aggregated over every task spawned through this executor.
    pub fn stats(&self) -> &Arc<MonitorStats> {
        &self.stats
    }

    /// Wraps `work` without scheduling it.
    pub fn monitor<W>(&self, label: impl Into<Arc<str>>, work: W) -> TaskMonitor<W> {
        let monitor = TaskMonitor::new(label, work, self.cfg, Arc::clone(&self.stats));
        match &self.bus {
            Some(bus) => monitor.with_bus(bus.clone()),
            None => monitor,
        }
    }

    /// Spawns a monitored future. Must be called inside a tokio runtime.
    pub fn spawn<F>(&self, label: impl Into<Arc<str>>, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.monitor(label, fut).run())
    }

    /// Runs a monitored closure on the blocking pool.
    pub fn spawn_blocking<F, T>(&self, label: impl Into<Arc<str>>, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let monitor = self.monitor(label, f);
        tokio::task::spawn_blocking(move || monitor.call())
    }
}

impl Default for SharedExecutor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl std::fmt::Debug for SharedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedExecutor")
            .field("cfg", &self.cfg)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_spawn_shares_stats_across_tasks() {
        let exec = SharedExecutor::default();
        let a = exec.spawn("a", async { 1 });
        let b = exec.spawn("b", async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            2
        });
        assert_eq!(a.await.unwrap() + b.await.unwrap(), 3);
        assert_eq!(exec.stats().completed(), 2);
        assert_eq!(exec.stats().slow_run(), 1);
    }

    #[tokio::test]
    async fn test_slow_task_is_published_on_bus() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let exec = SharedExecutor::default().with_bus(bus);
        exec.spawn("slow", tokio::time::sleep(Duration::from_millis(220)))
            .await
            .unwrap();

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::TaskRanTooLong);
        assert_eq!(ev.reason.as_deref(), Some("slow"));
        assert!(ev.elapsed_ms.unwrap() >= 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_blocking_returns_value() {
        let exec = SharedExecutor::default();
        let v = exec.spawn_blocking("sum", || (1..=10).sum::<u32>()).await.unwrap();
        assert_eq!(v, 55);
        assert_eq!(exec.stats().active_watchdogs(), 0);
    }
}
