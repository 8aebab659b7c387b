/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `records`: rec:{unix_ms:020}:{uuid_v7} -> LogRecord (JSON)
/// - `metadata`: meta:{key} -> value (string)
///
/// Record keys sort by timestamp first, so everything older than a cutoff is
/// the key range below `rec:{cutoff_ms:020}:`.
use uuid::Uuid;

const RECORD_PREFIX: &str = "rec:";

/// Encode a record key: rec:{unix_ms:020}:{id}
pub fn encode_record_key(unix_ms: u64, id: Uuid) -> Vec<u8> {
    format!("{}{:020}:{}", RECORD_PREFIX, unix_ms, id).into_bytes()
}

/// Exclusive upper bound for all records strictly before `unix_ms`
pub fn encode_cutoff_key(unix_ms: u64) -> Vec<u8> {
    format!("{}{:020}:", RECORD_PREFIX, unix_ms).into_bytes()
}

/// Lower bound covering every record key
pub fn encode_record_floor() -> Vec<u8> {
    RECORD_PREFIX.as_bytes().to_vec()
}

/// Decode a record key: rec:{unix_ms:020}:{id} -> (unix_ms, id)
pub fn decode_record_key(key: &[u8]) -> Option<(u64, Uuid)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (millis, id) = key_str.strip_prefix(RECORD_PREFIX)?.split_once(':')?;
    Some((millis.parse().ok()?, Uuid::parse_str(id).ok()?))
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
