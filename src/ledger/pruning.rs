/// Timestamp-based vacuuming of the records partition
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionHandle};
use tracing::debug;

use super::error::Result;
use super::partitions::{encode_cutoff_key, encode_meta_key, encode_record_floor};
use super::record::unix_millis;

/// Metadata key holding the cutoff of the last successful vacuum
pub(crate) const META_LAST_VACUUM: &str = "last_vacuum";

/// Delete every record strictly older than `cutoff`.
///
/// All deletions go into one write batch, so either every eligible record is
/// removed or none is.
pub fn vacuum_before(
    keyspace: &Keyspace,
    records: &PartitionHandle,
    metadata: &PartitionHandle,
    cutoff: DateTime<Utc>,
) -> Result<usize> {
    let upper = encode_cutoff_key(unix_millis(cutoff));

    let mut batch = keyspace.batch();
    let mut pruned = 0;

    for item in records.range(encode_record_floor()..upper) {
        let (key, _) = item?;
        batch.remove(records, key);
        pruned += 1;
    }

    batch.insert(
        metadata,
        encode_meta_key(META_LAST_VACUUM),
        cutoff.to_rfc3339().into_bytes(),
    );
    batch.commit()?;

    keyspace.persist(fjall::PersistMode::SyncAll)?;
    debug!(%cutoff, pruned, "Vacuum batch committed");

    Ok(pruned)
}

/// Count records strictly older than `cutoff` without touching them
pub fn count_before(records: &PartitionHandle, cutoff: DateTime<Utc>) -> Result<usize> {
    let upper = encode_cutoff_key(unix_millis(cutoff));
    let mut count = 0;

    for item in records.range(encode_record_floor()..upper) {
        item?;
        count += 1;
    }

    Ok(count)
}
