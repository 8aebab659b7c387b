use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{LogBackend, VacuumRequest};
use crate::retention::cutoff::is_expired;
use crate::retention::error::BackendError;

/// In-process record store, mostly for tests and dry runs
#[derive(Debug)]
pub struct MemoryBackend {
    records: Mutex<Vec<DateTime<Utc>>>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        let backend = Self::new();
        backend
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
        backend
    }

    pub fn push(&self, at: DateTime<Utc>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(at);
    }

    /// Timestamps still stored, sorted
    pub fn remaining(&self) -> Vec<DateTime<Utc>> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        records.sort();
        records
    }

    /// Simulate the store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogBackend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn vacuum(&self, request: &VacuumRequest) -> Result<usize, BackendError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable(
                "memory backend marked unavailable".to_string(),
            ));
        }

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|at| !is_expired(*at, request.cutoff));
        Ok(before - records.len())
    }
}
