use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// The single external executable the supervisor keeps alive
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_name")]
    pub name: String,
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Time between SIGTERM and SIGKILL when stopping the worker
    #[serde(default = "default_stop_timeout_seconds")]
    pub stop_timeout_seconds: u64,
    /// Also append worker output to the ledger (in addition to tracing)
    #[serde(default)]
    pub capture_to_ledger: bool,
    /// Extra environment passed to the worker on top of the inherited one
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            program: default_program(),
            args: default_args(),
            working_dir: default_working_dir(),
            stop_timeout_seconds: default_stop_timeout_seconds(),
            capture_to_ledger: false,
            env: BTreeMap::new(),
        }
    }
}

fn default_worker_name() -> String {
    "vital-sign-listener".to_string()
}

fn default_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_args() -> Vec<String> {
    vec!["vital_sign_listener.py".to_string()]
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_stop_timeout_seconds() -> u64 {
    10
}

/// When the supervisor relaunches a worker after it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    Never,
}

impl RestartPolicy {
    /// Whether an exit with `code` should lead to a restart.
    ///
    /// `None` means the worker was killed by a signal, which counts as a failure.
    pub fn restarts_after(&self, code: Option<i32>) -> bool {
        match self {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => code != Some(0),
            RestartPolicy::Never => false,
        }
    }

    /// Whether a failed launch is retried
    pub fn retries_launch(&self) -> bool {
        !matches!(self, RestartPolicy::Never)
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Never => "never",
        };
        f.write_str(s)
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(RestartPolicy::Always),
            "on-failure" | "on_failure" => Ok(RestartPolicy::OnFailure),
            "never" | "no" => Ok(RestartPolicy::Never),
            other => Err(format!(
                "unknown restart policy '{}', expected always, on-failure or never",
                other
            )),
        }
    }
}

/// How the restart delay evolves across consecutive restarts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Supervisor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default = "default_restart_delay_seconds")]
    pub restart_delay_seconds: u64,
    #[serde(default)]
    pub backoff: Backoff,
    /// Upper bound for exponential backoff
    #[serde(default = "default_max_restart_delay_seconds")]
    pub max_restart_delay_seconds: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart: RestartPolicy::default(),
            restart_delay_seconds: default_restart_delay_seconds(),
            backoff: Backoff::default(),
            max_restart_delay_seconds: default_max_restart_delay_seconds(),
        }
    }
}

fn default_restart_delay_seconds() -> u64 {
    5
}

fn default_max_restart_delay_seconds() -> u64 {
    300
}

/// Which log store retention operates on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ledger,
    Journal,
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Records older than this many calendar days are vacuumed
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Scope of deletion, one prune at a time per unit
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Run pruning from inside `vitalsd run` on a timer
    #[serde(default = "default_schedule")]
    pub schedule: bool,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            unit: default_unit(),
            backend: BackendKind::default(),
            ledger_path: default_ledger_path(),
            schedule: default_schedule(),
            interval_hours: default_interval_hours(),
        }
    }
}

fn default_window_days() -> u32 {
    7
}

fn default_unit() -> String {
    "vital-sign-listener".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_schedule() -> bool {
    true
}

fn default_interval_hours() -> u64 {
    24
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Forces debug-level logging
    #[serde(default)]
    pub debug: bool,
    /// Serve `/health` and `/status` here when set
    pub status_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug: false,
            status_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
