use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::backend::{LogBackend, VacuumRequest};
use super::cutoff::cutoff_for;
use super::error::{Result, RetentionError};
use super::guard::PruneGuard;
use crate::clock::{Clock, SystemClock};
use crate::config::RetentionConfig;
use crate::observability::Metrics;

/// Outcome of one successful prune
#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub unit: String,
    pub window_days: u32,
    pub cutoff: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub removed: usize,
}

/// Decides what is expired and asks the backend to vacuum it
pub struct RetentionPolicy {
    backend: Arc<dyn LogBackend>,
    guard: PruneGuard,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl RetentionPolicy {
    pub fn new(backend: Arc<dyn LogBackend>) -> Self {
        Self {
            backend,
            guard: PruneGuard::new(),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Share a guard with other policies over the same units
    pub fn with_guard(mut self, guard: PruneGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Clock used for the start/completion timestamps of the summary line
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn guard(&self) -> &PruneGuard {
        &self.guard
    }

    /// Remove every record older than `window_days` calendar days before `now`.
    ///
    /// Failures are logged here, once, with their kind and cause; callers only
    /// need to map the returned error.
    pub async fn prune(&self, now: DateTime<Utc>, config: &RetentionConfig) -> Result<PruneReport> {
        let cutoff = match cutoff_for(now, config.window_days) {
            Ok(cutoff) => cutoff,
            Err(e) => {
                let err = RetentionError::Config(e);
                error!(kind = err.kind(), unit = %config.unit, cause = %err, "Retention pass rejected");
                return Err(err);
            }
        };

        let Some(_lease) = self.guard.try_acquire(&config.unit) else {
            let err = RetentionError::AlreadyRunning(config.unit.clone());
            warn!(kind = err.kind(), unit = %config.unit, cause = %err, "Retention pass skipped");
            return Err(err);
        };

        let started_at = self.clock.now();
        let request = VacuumRequest {
            unit: config.unit.clone(),
            cutoff,
            now,
        };

        let removed = match self.backend.vacuum(&request).await {
            Ok(removed) => removed,
            Err(e) => {
                let err = RetentionError::BackendUnavailable(e);
                error!(
                    kind = err.kind(),
                    unit = %config.unit,
                    backend = %self.backend.describe(),
                    cause = %err,
                    "Retention pass failed, nothing removed"
                );
                return Err(err);
            }
        };

        let completed_at = self.clock.now();
        self.metrics.prune_completed(removed);

        info!(
            unit = %config.unit,
            window_days = config.window_days,
            %cutoff,
            %started_at,
            %completed_at,
            removed,
            "Retention pass complete"
        );

        Ok(PruneReport {
            unit: config.unit.clone(),
            window_days: config.window_days,
            cutoff,
            started_at,
            completed_at,
            removed,
        })
    }
}
