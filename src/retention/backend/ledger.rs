use std::path::Path;

use async_trait::async_trait;

use super::{LogBackend, VacuumRequest};
use crate::ledger::LogLedger;
use crate::retention::error::BackendError;

/// Retention over the fjall ledger the supervisor writes worker output into
#[derive(Debug, Clone)]
pub struct LedgerBackend {
    ledger: LogLedger,
}

impl LedgerBackend {
    /// Open the ledger; any failure means the backend is unreachable
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let ledger = LogLedger::open(path).map_err(|e| {
            BackendError::Unreachable(format!("cannot open ledger at {}: {}", path.display(), e))
        })?;
        Ok(Self { ledger })
    }

    /// Share a ledger that is already open in this process
    pub fn from_ledger(ledger: LogLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LogLedger {
        &self.ledger
    }
}

#[async_trait]
impl LogBackend for LedgerBackend {
    fn describe(&self) -> String {
        "ledger".to_string()
    }

    async fn vacuum(&self, request: &VacuumRequest) -> Result<usize, BackendError> {
        let ledger = self.ledger.clone();
        let cutoff = request.cutoff;

        let removed = tokio::task::spawn_blocking(move || ledger.vacuum_before(cutoff))
            .await
            .map_err(|e| BackendError::Unreachable(format!("vacuum task failed: {}", e)))??;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LogRecord, Stream};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_vacuum_through_backend() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LedgerBackend::open(temp_dir.path().join("ledger")).unwrap();

        for day in [1, 2, 3, 4] {
            let at = Utc.with_ymd_and_hms(2024, 3, day, 6, 0, 0).unwrap();
            backend
                .ledger()
                .append(&LogRecord::new(at, "unit", Stream::Stdout, "line"))
                .unwrap();
        }

        let request = VacuumRequest {
            unit: "unit".to_string(),
            cutoff: Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap(),
            now: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
        };

        assert_eq!(backend.vacuum(&request).await.unwrap(), 2);
        assert_eq!(backend.vacuum(&request).await.unwrap(), 0);
        assert_eq!(backend.ledger().stats().unwrap().record_count, 2);
    }

    #[test]
    fn test_unopenable_path_is_unreachable() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = LedgerBackend::open(blocker.join("ledger"));
        assert!(matches!(result, Err(BackendError::Unreachable(_))));
    }
}
