//! Log retention: cutoff computation, pruning and the cleanup entry point
//!
//! A prune removes every record older than `window_days` calendar days
//! before "now" and keeps everything at or after that midnight. Pruning is
//! all-or-nothing per invocation, idempotent for a fixed `now`, and at most
//! one prune runs per log unit at a time.
//!
//! ```rust,ignore
//! use vitalsd::retention::{backend_from_config, RetentionPolicy};
//!
//! let backend = backend_from_config(&config.retention)?;
//! let report = RetentionPolicy::new(backend).prune(Utc::now(), &config.retention).await?;
//! println!("removed {}", report.removed);
//! ```

pub mod backend;
pub mod cleanup;
pub mod cutoff;
pub mod error;
pub mod guard;
pub mod policy;

pub use backend::{
    backend_from_config, JournalBackend, LedgerBackend, LogBackend, MemoryBackend, VacuumRequest,
};
pub use cleanup::{run_cleanup_once, run_cleanup_with, CleanupStatus};
pub use cutoff::{cutoff_for, is_expired};
pub use error::{BackendError, RetentionError};
pub use guard::{PruneGuard, PruneLease};
pub use policy::{PruneReport, RetentionPolicy};
