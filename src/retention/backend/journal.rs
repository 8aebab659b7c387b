use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{LogBackend, VacuumRequest};
use crate::retention::error::BackendError;

const JOURNALCTL: &str = "journalctl";
const DELETED_MARKER: &str = "Deleted archived journal";

/// Retention through `journalctl --vacuum-time`.
///
/// journald only vacuums whole archived files and applies the age limit to
/// the entire journal, so `unit` is informational here.
#[derive(Debug, Clone)]
pub struct JournalBackend {
    program: PathBuf,
}

impl Default for JournalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl JournalBackend {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(JOURNALCTL),
        }
    }

    /// Use a different journalctl binary
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The `--vacuum-time` argument for a request, never below one second
    pub fn vacuum_time_arg(request: &VacuumRequest) -> String {
        let secs = (request.now - request.cutoff).num_seconds().max(1);
        format!("--vacuum-time={}s", secs)
    }
}

/// Number of archived journal files journalctl reports as deleted
pub fn count_deleted_archives(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with(DELETED_MARKER))
        .count()
}

#[async_trait]
impl LogBackend for JournalBackend {
    fn describe(&self) -> String {
        format!("journal ({})", self.program.display())
    }

    async fn vacuum(&self, request: &VacuumRequest) -> Result<usize, BackendError> {
        let arg = Self::vacuum_time_arg(request);
        debug!(program = %self.program.display(), %arg, unit = %request.unit, "Running journal vacuum");

        let output = Command::new(&self.program)
            .arg(&arg)
            .output()
            .await
            .map_err(|e| {
                BackendError::Unreachable(format!("cannot run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            return Err(BackendError::Journal {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // journalctl reports deletions on stderr; accept both streams
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(count_deleted_archives(&stderr) + count_deleted_archives(&stdout))
    }
}
