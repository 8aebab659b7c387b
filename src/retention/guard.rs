//! One prune at a time per log unit

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct PruneGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

impl PruneGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `unit`, or `None` if a prune for it is already in flight.
    /// The claim is released when the returned lease is dropped.
    pub fn try_acquire(&self, unit: &str) -> Option<PruneLease> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(unit.to_string()) {
            return None;
        }

        Some(PruneLease {
            unit: unit.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(unit)
    }
}

#[derive(Debug)]
pub struct PruneLease {
    unit: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl PruneLease {
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl Drop for PruneLease {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.unit);
    }
}
