use thiserror::Error;

use crate::config::ValidationError;
use crate::ledger::LedgerError;

/// Failures reaching or driving a log backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("journalctl exited with {status}: {stderr}")]
    Journal { status: String, stderr: String },
}

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("invalid retention configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("log backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    #[error("a prune for unit '{0}' is already running")]
    AlreadyRunning(String),
}

impl RetentionError {
    /// Short machine-friendly kind used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            RetentionError::Config(_) => "config_error",
            RetentionError::BackendUnavailable(_) => "backend_unavailable",
            RetentionError::AlreadyRunning(_) => "already_running",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetentionError>;
