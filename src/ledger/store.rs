use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use fs2::FileExt;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{LedgerError, Result};
use super::partitions::{decode_record_key, encode_meta_key, encode_record_key};
use super::pruning::{count_before, vacuum_before, META_LAST_VACUUM};
use super::record::{unix_millis, LogRecord};

/// Fjall-backed persistent storage for captured worker output
///
/// fjall does not guard against a second process opening the same
/// directory, so every ledger holds an exclusive advisory lock on a
/// sibling `<path>.lock` file for as long as any clone is alive.
#[derive(Clone)]
pub struct LogLedger {
    keyspace: Keyspace,
    records: PartitionHandle,
    metadata: PartitionHandle,
    _lock: Arc<File>,
}

impl std::fmt::Debug for LogLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLedger").finish_non_exhaustive()
    }
}

impl LogLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening log ledger at: {}", path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock = acquire_lock(path)?;
        let keyspace = Config::new(path).open()?;

        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            records,
            metadata,
            _lock: Arc::new(lock),
        })
    }

    /// Append a record; records with equal timestamps never collide
    pub fn append(&self, record: &LogRecord) -> Result<()> {
        let key = encode_record_key(unix_millis(record.timestamp), Uuid::now_v7());
        let value = serde_json::to_vec(record)?;
        self.records.insert(key, value)?;
        debug!(unit = %record.unit, stream = %record.stream, "Appended log record");
        Ok(())
    }

    /// Records in timestamp order
    pub fn records(&self) -> Result<Vec<LogRecord>> {
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item?;
            if decode_record_key(&key).is_none() {
                return Err(LedgerError::InvalidKey(
                    String::from_utf8_lossy(&key).to_string(),
                ));
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Remove every record strictly older than `cutoff`, returning how many went
    pub fn vacuum_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        vacuum_before(&self.keyspace, &self.records, &self.metadata, cutoff)
    }

    /// How many records a vacuum at `cutoff` would remove
    pub fn count_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        count_before(&self.records, cutoff)
    }

    /// Cutoff used by the most recent successful vacuum
    pub fn last_vacuum(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.metadata.get(encode_meta_key(META_LAST_VACUUM))? else {
            return Ok(None);
        };

        let text = String::from_utf8_lossy(&raw);
        let parsed = DateTime::parse_from_rfc3339(&text)
            .map_err(|e| LedgerError::InvalidKey(format!("{}: {}", META_LAST_VACUUM, e)))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<LedgerStats> {
        let mut record_count = 0;
        let mut oldest = None;

        for item in self.records.iter() {
            let (key, _) = item?;
            if oldest.is_none() {
                oldest = decode_record_key(&key).map(|(millis, _)| millis);
            }
            record_count += 1;
        }

        Ok(LedgerStats {
            record_count,
            oldest_unix_ms: oldest,
        })
    }
}

/// `data/ledger` -> `data/ledger.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;

    file.try_lock_exclusive().map_err(|source| LedgerError::Locked {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file)
}

#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub record_count: usize,
    pub oldest_unix_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Stream;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_ledger() -> (LogLedger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = LogLedger::open(temp_dir.path().join("test_ledger")).unwrap();
        (ledger, temp_dir)
    }

    fn record_on(year: i32, month: u32, day: u32, message: &str) -> LogRecord {
        LogRecord::new(
            Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            "vital-sign-listener",
            Stream::Stdout,
            message,
        )
    }

    #[test]
    fn test_open_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = LogLedger::open(temp_dir.path().join("test_ledger"));
        assert!(ledger.is_ok());
    }

    #[test]
    fn test_append_and_read_in_timestamp_order() {
        let (ledger, _temp) = create_test_ledger();

        ledger.append(&record_on(2024, 3, 5, "later")).unwrap();
        ledger.append(&record_on(2024, 3, 1, "earlier")).unwrap();

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "earlier");
        assert_eq!(records[1].message, "later");
    }

    #[test]
    fn test_vacuum_removes_only_older_records() {
        let (ledger, _temp) = create_test_ledger();
        ledger.append(&record_on(2024, 3, 1, "old")).unwrap();
        ledger.append(&record_on(2024, 3, 4, "new")).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        assert_eq!(ledger.count_before(cutoff).unwrap(), 1);

        let pruned = ledger.vacuum_before(cutoff).unwrap();
        assert_eq!(pruned, 1);

        let remaining = ledger.records().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "new");
        assert_eq!(ledger.last_vacuum().unwrap(), Some(cutoff));
    }

    #[test]
    fn test_record_at_cutoff_survives() {
        let (ledger, _temp) = create_test_ledger();
        let cutoff = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        ledger
            .append(&LogRecord::new(cutoff, "unit", Stream::Stderr, "boundary"))
            .unwrap();

        assert_eq!(ledger.vacuum_before(cutoff).unwrap(), 0);
        assert_eq!(ledger.records().unwrap().len(), 1);
    }

    #[test]
    fn test_same_timestamp_records_do_not_collide() {
        let (ledger, _temp) = create_test_ledger();
        let record = record_on(2024, 3, 1, "dup");

        ledger.append(&record).unwrap();
        ledger.append(&record).unwrap();

        assert_eq!(ledger.stats().unwrap().record_count, 2);
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let (ledger, temp) = create_test_ledger();
        let path = temp.path().join("test_ledger");

        let second = LogLedger::open(&path);
        assert!(matches!(second, Err(LedgerError::Locked { .. })));

        // Clones share the lock; it is released once the last one drops
        let clone = ledger.clone();
        drop(ledger);
        assert!(LogLedger::open(&path).is_err());
        drop(clone);
        assert!(LogLedger::open(&path).is_ok());
    }

    #[test]
    fn test_lock_path_is_a_sibling() {
        assert_eq!(
            lock_path(Path::new("data/ledger")),
            PathBuf::from("data/ledger.lock")
        );
    }

    #[test]
    fn test_stats() {
        let (ledger, _temp) = create_test_ledger();
        assert!(ledger.last_vacuum().unwrap().is_none());

        let first = record_on(2024, 3, 1, "a");
        ledger.append(&first).unwrap();
        ledger.append(&record_on(2024, 3, 2, "b")).unwrap();
        ledger.persist().unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.oldest_unix_ms, Some(unix_millis(first.timestamp)));
    }
}
