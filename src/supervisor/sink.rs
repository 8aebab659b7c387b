//! Where worker stdout/stderr lines end up

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::ledger::{LogLedger, LogRecord, Stream};

pub trait LogSink: Send + Sync {
    fn write(&self, unit: &str, stream: Stream, line: &str);
}

/// Forwards lines into the tracing subscriber. Under systemd that output is
/// what journald records for the unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, unit: &str, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => info!(target: "worker", unit, %stream, "{}", line),
            Stream::Stderr => warn!(target: "worker", unit, %stream, "{}", line),
        }
    }
}

enum LedgerCommand {
    Append(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// Appends lines to the fjall ledger so ledger retention has records to prune
///
/// Inserts happen on one blocking writer task fed by a channel, so the output
/// forwarders never wait on disk. The writer ends when the last clone drops.
#[derive(Debug, Clone)]
pub struct LedgerSink {
    commands: mpsc::UnboundedSender<LedgerCommand>,
    clock: Arc<dyn Clock>,
}

impl LedgerSink {
    /// Must be called inside a tokio runtime
    pub fn new(ledger: LogLedger) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || write_loop(ledger, rx));
        Self {
            commands: tx,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolves once every line written before this call is in the ledger
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(LedgerCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

fn write_loop(ledger: LogLedger, mut rx: mpsc::UnboundedReceiver<LedgerCommand>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            LedgerCommand::Append(record) => {
                if let Err(e) = ledger.append(&record) {
                    warn!(kind = "ledger_append", unit = %record.unit, cause = %e, "Failed to store worker output");
                }
            }
            LedgerCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

impl LogSink for LedgerSink {
    fn write(&self, unit: &str, stream: Stream, line: &str) {
        let record = LogRecord::new(self.clock.now(), unit, stream, line);
        if self.commands.send(LedgerCommand::Append(record)).is_err() {
            warn!(kind = "ledger_append", unit, "Ledger writer has stopped, dropping worker output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ledger_sink_stamps_with_clock() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = LogLedger::open(temp_dir.path().join("ledger")).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();
        let sink = LedgerSink::new(ledger.clone()).with_clock(Arc::new(ManualClock::new(at)));

        sink.write("vital-sign-listener", Stream::Stderr, "Connection refused");
        sink.flush().await;

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, at);
        assert_eq!(records[0].stream, Stream::Stderr);
        assert_eq!(records[0].message, "Connection refused");
    }
}
