use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output stream a worker line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One captured log line
///
/// Retention only ever looks at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub unit: String,
    pub stream: Stream,
    pub message: String,
}

impl LogRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        unit: impl Into<String>,
        stream: Stream,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            unit: unit.into(),
            stream,
            message: message.into(),
        }
    }
}

/// Milliseconds since the epoch, clamped at zero for pre-1970 instants
pub(crate) fn unix_millis(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}
