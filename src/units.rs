//! systemd unit rendering for deployments that let the host schedule cleanup
//!
//! The daemon service keeps `Restart=no`: restarts are the supervisor's job,
//! and letting systemd restart too would double the delay.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{BackendKind, Config};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    pub file_name: String,
    pub contents: String,
}

/// Everything the unit files need that is not already in [`Config`]
#[derive(Debug, Clone)]
pub struct UnitOptions {
    /// Absolute path of the `vitalsd` binary
    pub executable: PathBuf,
    /// Passed as `--config` when set
    pub config_path: Option<PathBuf>,
}

/// Whether the host scheduler should run `vitalsd cleanup`.
///
/// When the daemon prunes its own ledger it holds the ledger lock, so a
/// timer-driven cleanup against the same ledger could only ever fail.
pub fn needs_cleanup_timer(config: &Config) -> bool {
    config.retention.backend == BackendKind::Journal || !config.retention.schedule
}

/// Render the daemon service and, when the host schedules retention, the
/// cleanup oneshot with its daily timer
pub fn render(config: &Config, options: &UnitOptions) -> Vec<UnitFile> {
    let name = &config.worker.name;
    let working_dir = config.worker.working_dir.display();

    let base = match &options.config_path {
        Some(path) => format!("{} --config {}", options.executable.display(), path.display()),
        None => options.executable.display().to_string(),
    };

    let mut service = String::new();
    let _ = writeln!(service, "[Unit]");
    let _ = writeln!(service, "Description=Supervised {} worker", name);
    let _ = writeln!(service, "After=network-online.target");
    let _ = writeln!(service, "Wants=network-online.target");
    let _ = writeln!(service);
    let _ = writeln!(service, "[Service]");
    let _ = writeln!(service, "Type=simple");
    let _ = writeln!(service, "WorkingDirectory={}", working_dir);
    let _ = writeln!(service, "ExecStart={} run", base);
    let _ = writeln!(service, "Restart=no");
    let _ = writeln!(service, "KillMode=mixed");
    let _ = writeln!(service);
    let _ = writeln!(service, "[Install]");
    let _ = writeln!(service, "WantedBy=multi-user.target");

    let mut units = vec![UnitFile {
        file_name: format!("{}.service", name),
        contents: service,
    }];

    if !needs_cleanup_timer(config) {
        return units;
    }

    let mut cleanup = String::new();
    let _ = writeln!(cleanup, "[Unit]");
    let _ = writeln!(
        cleanup,
        "Description=Prune {} logs older than {} days",
        config.retention.unit, config.retention.window_days
    );
    let _ = writeln!(cleanup);
    let _ = writeln!(cleanup, "[Service]");
    let _ = writeln!(cleanup, "Type=oneshot");
    let _ = writeln!(cleanup, "WorkingDirectory={}", working_dir);
    let _ = writeln!(cleanup, "ExecStart={} cleanup", base);

    let mut timer = String::new();
    let _ = writeln!(timer, "[Unit]");
    let _ = writeln!(timer, "Description=Daily log cleanup for {}", name);
    let _ = writeln!(timer);
    let _ = writeln!(timer, "[Timer]");
    let _ = writeln!(timer, "OnCalendar=daily");
    let _ = writeln!(timer, "Persistent=true");
    let _ = writeln!(timer, "Unit={}-cleanup.service", name);
    let _ = writeln!(timer);
    let _ = writeln!(timer, "[Install]");
    let _ = writeln!(timer, "WantedBy=timers.target");

    units.push(UnitFile {
        file_name: format!("{}-cleanup.service", name),
        contents: cleanup,
    });
    units.push(UnitFile {
        file_name: format!("{}-cleanup.timer", name),
        contents: timer,
    });
    units
}

/// Write rendered units into `dir`, creating it if needed
pub fn write_units(dir: &Path, units: &[UnitFile]) -> std::io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(units.len());
    for unit in units {
        let path = dir.join(&unit.file_name);
        fs::write(&path, &unit.contents)?;
        info!(path = %path.display(), "Wrote unit file");
        written.push(path);
    }
    Ok(written)
}
