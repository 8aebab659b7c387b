//! Log stores that retention can vacuum

mod journal;
mod ledger;
mod memory;

pub use journal::{count_deleted_archives, JournalBackend};
pub use ledger::LedgerBackend;
pub use memory::MemoryBackend;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::BackendError;
use crate::config::{BackendKind, RetentionConfig};

/// What a single vacuum should remove
#[derive(Debug, Clone)]
pub struct VacuumRequest {
    pub unit: String,
    /// Records strictly before this instant go
    pub cutoff: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// A log store that can delete records older than a cutoff.
///
/// Implementations must be all-or-nothing: when `vacuum` returns an error no
/// record may have been removed.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Human-readable identifier for log lines
    fn describe(&self) -> String;

    /// Delete eligible records, returning how many were removed
    async fn vacuum(&self, request: &VacuumRequest) -> Result<usize, BackendError>;
}

/// Build the backend named by the retention config
pub fn backend_from_config(
    retention: &RetentionConfig,
) -> Result<Arc<dyn LogBackend>, BackendError> {
    match retention.backend {
        BackendKind::Ledger => Ok(Arc::new(LedgerBackend::open(&retention.ledger_path)?)),
        BackendKind::Journal => Ok(Arc::new(JournalBackend::new())),
    }
}
