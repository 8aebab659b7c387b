/// Fjall-based persistent ledger for captured worker output
///
/// The supervisor can forward every stdout/stderr line of the worker into
/// this ledger. Retention then vacuums it by timestamp: record keys are
/// ordered by capture time, so a prune is one range scan plus one atomic
/// write batch.
///
/// ## Partitions
///
/// - `records`: one JSON `LogRecord` per captured line
/// - `metadata`: cutoff of the last successful vacuum
///
/// ## Usage
///
/// ```rust,ignore
/// use vitalsd::ledger::{LogLedger, LogRecord, Stream};
///
/// let ledger = LogLedger::open("data/ledger")?;
/// ledger.append(&LogRecord::new(Utc::now(), "vital-sign-listener", Stream::Stdout, "HR=72"))?;
/// let removed = ledger.vacuum_before(cutoff)?;
/// ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod record;
pub mod store;

pub use error::{LedgerError, Result};
pub use record::{LogRecord, Stream};
pub use store::{LedgerStats, LogLedger};
