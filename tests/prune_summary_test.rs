//! A prune writes exactly one INFO summary line, including the ledger's
//! blocking vacuum thread. Kept in its own binary because it installs a
//! global subscriber.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

use common::Recorder;
use vitalsd::config::RetentionConfig;
use vitalsd::ledger::{LogLedger, LogRecord, Stream};
use vitalsd::retention::{LedgerBackend, RetentionPolicy};

#[tokio::test]
async fn test_prune_emits_single_summary_line() {
    let recorder = Recorder::default();
    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(recorder.clone()))
        .unwrap();

    let temp_dir = TempDir::new().unwrap();
    let config = RetentionConfig {
        ledger_path: temp_dir.path().join("ledger"),
        ..RetentionConfig::default()
    };
    let ledger = LogLedger::open(&config.ledger_path).unwrap();
    for day in 1..=5 {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        ledger
            .append(&LogRecord::new(at, &config.unit, Stream::Stdout, "HR=72"))
            .unwrap();
    }

    let policy = RetentionPolicy::new(Arc::new(LedgerBackend::from_ledger(ledger)));
    let infos_before = recorder.count(Level::INFO);

    let now = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
    let report = policy.prune(now, &config).await.unwrap();
    assert_eq!(report.removed, 2);

    let infos = recorder.at(Level::INFO);
    let new_lines = &infos[infos_before..];
    assert_eq!(new_lines.len(), 1, "{:?}", new_lines);

    let summary = &new_lines[0];
    for field in ["unit", "window_days", "started_at", "completed_at", "removed"] {
        assert!(summary.fields.iter().any(|f| f == field), "missing {field}: {:?}", summary);
    }
}
