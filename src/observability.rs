//! Tracing setup and process-wide counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level is used, or
/// `debug` when debug mode is on.
pub fn init_tracing(telemetry: &TelemetryConfig) {
    let fallback = if telemetry.debug {
        "debug".to_string()
    } else {
        telemetry.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    workers_launched: AtomicU64,
    launch_failures: AtomicU64,
    worker_exits: AtomicU64,
    restarts_scheduled: AtomicU64,
    prune_runs: AtomicU64,
    records_pruned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_launched(&self) {
        self.workers_launched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "workers_launched", "Metric incremented");
    }

    pub fn launch_failed(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "launch_failures", "Metric incremented");
    }

    pub fn worker_exited(&self) {
        self.worker_exits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "worker_exits", "Metric incremented");
    }

    pub fn restart_scheduled(&self) {
        self.restarts_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "restarts_scheduled", "Metric incremented");
    }

    pub fn prune_completed(&self, removed: usize) {
        self.prune_runs.fetch_add(1, Ordering::Relaxed);
        self.records_pruned
            .fetch_add(removed as u64, Ordering::Relaxed);
        tracing::debug!(counter = "prune_runs", removed, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workers_launched: self.workers_launched.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            worker_exits: self.worker_exits.load(Ordering::Relaxed),
            restarts_scheduled: self.restarts_scheduled.load(Ordering::Relaxed),
            prune_runs: self.prune_runs.load(Ordering::Relaxed),
            records_pruned: self.records_pruned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub workers_launched: u64,
    pub launch_failures: u64,
    pub worker_exits: u64,
    pub restarts_scheduled: u64,
    pub prune_runs: u64,
    pub records_pruned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.worker_launched();
        metrics.worker_launched();
        metrics.prune_completed(5);
        metrics.prune_completed(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.workers_launched, 2);
        assert_eq!(snapshot.prune_runs, 2);
        assert_eq!(snapshot.records_pruned, 5);
        assert_eq!(snapshot.launch_failures, 0);
    }
}
