//! `run_cleanup_once`: the single entry point for the host scheduler

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use super::backend::backend_from_config;
use super::error::RetentionError;
use super::policy::RetentionPolicy;
use crate::config::RetentionConfig;
use crate::observability::Metrics;

/// Result of a cleanup invocation, mapped onto process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStatus {
    /// Includes "nothing to prune"
    Success,
    ConfigError,
    BackendUnavailable,
    AlreadyRunning,
}

impl CleanupStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            CleanupStatus::Success => 0,
            CleanupStatus::ConfigError => 1,
            CleanupStatus::BackendUnavailable => 2,
            CleanupStatus::AlreadyRunning => 3,
        }
    }
}

impl From<&RetentionError> for CleanupStatus {
    fn from(err: &RetentionError) -> Self {
        match err {
            RetentionError::Config(_) => CleanupStatus::ConfigError,
            RetentionError::BackendUnavailable(_) => CleanupStatus::BackendUnavailable,
            RetentionError::AlreadyRunning(_) => CleanupStatus::AlreadyRunning,
        }
    }
}

/// Open the configured backend and prune it once
pub async fn run_cleanup_once(
    retention: &RetentionConfig,
    now: DateTime<Utc>,
    metrics: Arc<Metrics>,
) -> CleanupStatus {
    let backend = match backend_from_config(retention) {
        Ok(backend) => backend,
        Err(e) => {
            error!(
                kind = "backend_unavailable",
                unit = %retention.unit,
                cause = %e,
                "Retention backend could not be opened"
            );
            return CleanupStatus::BackendUnavailable;
        }
    };

    let policy = RetentionPolicy::new(backend).with_metrics(metrics);
    run_cleanup_with(&policy, retention, now).await
}

/// Prune once through an existing policy
pub async fn run_cleanup_with(
    policy: &RetentionPolicy,
    retention: &RetentionConfig,
    now: DateTime<Utc>,
) -> CleanupStatus {
    match policy.prune(now, retention).await {
        Ok(_) => CleanupStatus::Success,
        Err(e) => CleanupStatus::from(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CleanupStatus::Success.exit_code(), 0);
        assert_eq!(CleanupStatus::ConfigError.exit_code(), 1);
        assert_eq!(CleanupStatus::BackendUnavailable.exit_code(), 2);
        assert_eq!(CleanupStatus::AlreadyRunning.exit_code(), 3);
    }

    #[test]
    fn test_error_mapping() {
        let err = RetentionError::AlreadyRunning("unit".to_string());
        assert_eq!(CleanupStatus::from(&err), CleanupStatus::AlreadyRunning);

        let err = RetentionError::Config(crate::config::ValidationError::InvalidRetentionWindow(0));
        assert_eq!(CleanupStatus::from(&err), CleanupStatus::ConfigError);
    }
}
