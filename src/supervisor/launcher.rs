//! Narrow process boundary: the supervisor asks for a launch and gets back a
//! handle it can wait on or terminate. Process creation itself is the OS's job.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::sink::LogSink;
use crate::config::WorkerConfig;
use crate::ledger::Stream;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working directory {0} does not exist")]
    MissingWorkingDir(PathBuf),
}

/// A launched worker
#[async_trait]
pub trait WorkerHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Resolves when the worker exits. `None` for a signal death.
    async fn wait(&mut self) -> Option<i32>;

    /// Kill the worker and reap it
    async fn terminate(&mut self);
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, instance: u64) -> Result<Box<dyn WorkerHandle>, LaunchError>;
}

/// Launches the configured executable with `tokio::process`
pub struct CommandLauncher {
    worker: WorkerConfig,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl CommandLauncher {
    pub fn new(worker: WorkerConfig) -> Self {
        Self {
            worker,
            sinks: Vec::new(),
        }
    }

    /// Forward every output line to `sink` as well
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.worker.program);
        command
            .args(&self.worker.args)
            .current_dir(&self.worker.working_dir)
            .envs(&self.worker.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self, instance: u64) -> Result<Box<dyn WorkerHandle>, LaunchError> {
        if !self.worker.working_dir.is_dir() {
            return Err(LaunchError::MissingWorkingDir(self.worker.working_dir.clone()));
        }

        let mut child = self.command().spawn().map_err(|source| LaunchError::Spawn {
            program: self.worker.program.clone(),
            source,
        })?;

        debug!(
            worker = %self.worker.name,
            instance,
            pid = ?child.id(),
            "Worker process spawned"
        );

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, Stream::Stdout, self.worker.name.clone(), self.sinks.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, Stream::Stderr, self.worker.name.clone(), self.sinks.clone());
        }

        Ok(Box::new(ChildWorker {
            child,
            grace: Duration::from_secs(self.worker.stop_timeout_seconds),
        }))
    }
}

fn forward_lines<R>(reader: R, stream: Stream, unit: String, sinks: Vec<Arc<dyn LogSink>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(trim_line_ending(&buf));
                    for sink in &sinks {
                        sink.write(&unit, stream, &line);
                    }
                }
                Err(e) => {
                    warn!(kind = "output_forwarding", unit = %unit, %stream, cause = %e, "Stopped reading worker output");
                    break;
                }
            }
        }
    });
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

struct ChildWorker {
    child: Child,
    grace: Duration,
}

impl ChildWorker {
    /// Ask the worker to exit; true once it has been reaped
    #[cfg(unix)]
    async fn request_exit(&mut self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            debug!(pid, error = %e, "Could not send SIGTERM");
            return false;
        }

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, %status, "Worker exited after SIGTERM");
                true
            }
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Failed to reap worker after SIGTERM");
                false
            }
            Err(_) => {
                warn!(pid, grace_secs = self.grace.as_secs(), "Worker ignored SIGTERM, killing");
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn request_exit(&mut self) -> bool {
        false
    }
}

#[async_trait]
impl WorkerHandle for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(kind = "wait_failed", pid = ?self.child.id(), cause = %e, "Lost track of worker exit status");
                None
            }
        }
    }

    async fn terminate(&mut self) {
        if self.request_exit().await {
            return;
        }
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Worker already gone when terminating");
        }
    }
}
