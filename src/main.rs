mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands, UnitsArgs};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use vitalsd::config::{BackendKind, Config, RetentionConfig, TelemetryConfig};
use vitalsd::ledger::LogLedger;
use vitalsd::observability::{init_tracing, Metrics};
use vitalsd::retention::{
    backend_from_config, run_cleanup_once, run_cleanup_with, LedgerBackend, LogBackend,
    RetentionPolicy,
};
use vitalsd::server::{self, AppState};
use vitalsd::supervisor::{CommandLauncher, LedgerSink, Supervisor, TracingSink};
use vitalsd::units::{self, UnitOptions};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&TelemetryConfig::default());
            error!(kind = "config_error", cause = %e, "Failed to load configuration");
            return ExitCode::from(1);
        }
    };
    init_tracing(&config.telemetry);

    let result = match cli.command {
        Commands::Run => run(config).await.map(|_| ExitCode::SUCCESS),
        Commands::Cleanup => {
            let status = run_cleanup_once(&config.retention, Utc::now(), Arc::new(Metrics::new())).await;
            Ok(ExitCode::from(status.exit_code()))
        }
        Commands::Units(args) => write_units(&config, cli.config, args).map(|_| ExitCode::SUCCESS),
        Commands::Config => print_config(&config).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "vitalsd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    // One keyspace per process: capture and scheduled pruning share it
    let ledger = open_shared_ledger(&config);

    let mut launcher = CommandLauncher::new(config.worker.clone()).with_sink(Arc::new(TracingSink));
    if config.worker.capture_to_ledger {
        match &ledger {
            Some(ledger) => launcher = launcher.with_sink(Arc::new(LedgerSink::new(ledger.clone()))),
            None => warn!("Worker output capture disabled, ledger is not available"),
        }
    }

    let supervisor = Supervisor::spawn_with(
        config.worker.name.clone(),
        &config.supervisor,
        Arc::new(launcher),
        Arc::new(vitalsd::clock::SystemClock),
        metrics.clone(),
    );

    info!(
        worker = %config.worker.name,
        program = %config.worker.program.display(),
        restart = %config.supervisor.restart,
        delay_secs = config.supervisor.restart_delay_seconds,
        "Starting supervisor"
    );
    supervisor.start().await?;

    let (server_stop, server_stopped) = oneshot::channel::<()>();
    let server_task = config.telemetry.status_addr.map(|addr| {
        let state = AppState::new(supervisor.clone(), metrics.clone());
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = server_stopped.await;
            };
            if let Err(e) = server::run(addr, state, shutdown).await {
                error!(%addr, error = %e, "Status server stopped");
            }
        })
    });

    let retention_task = if config.retention.schedule {
        match scheduled_backend(&config.retention, ledger) {
            Some(backend) => {
                let policy = RetentionPolicy::new(backend).with_metrics(metrics.clone());
                Some(tokio::spawn(retention_loop(policy, config.retention.clone())))
            }
            None => None,
        }
    } else {
        None
    };

    server::shutdown_signal().await;

    if let Some(task) = retention_task {
        task.abort();
    }
    supervisor.shutdown().await?;

    let _ = server_stop.send(());
    if let Some(task) = server_task {
        let _ = task.await;
    }

    info!("vitalsd stopped");
    Ok(())
}

fn open_shared_ledger(config: &Config) -> Option<LogLedger> {
    let wanted = config.worker.capture_to_ledger
        || (config.retention.schedule && config.retention.backend == BackendKind::Ledger);
    if !wanted {
        return None;
    }

    match LogLedger::open(&config.retention.ledger_path) {
        Ok(ledger) => Some(ledger),
        Err(e) => {
            error!(
                kind = "backend_unavailable",
                path = %config.retention.ledger_path.display(),
                cause = %e,
                "Failed to open log ledger"
            );
            None
        }
    }
}

fn scheduled_backend(retention: &RetentionConfig, ledger: Option<LogLedger>) -> Option<Arc<dyn LogBackend>> {
    match (retention.backend, ledger) {
        (BackendKind::Ledger, Some(ledger)) => Some(Arc::new(LedgerBackend::from_ledger(ledger))),
        (BackendKind::Ledger, None) => {
            warn!("Scheduled retention disabled, ledger is not available");
            None
        }
        (BackendKind::Journal, _) => match backend_from_config(retention) {
            Ok(backend) => Some(backend),
            Err(e) => {
                error!(kind = "backend_unavailable", cause = %e, "Scheduled retention disabled");
                None
            }
        },
    }
}

async fn retention_loop(policy: RetentionPolicy, retention: RetentionConfig) {
    let period = Duration::from_secs(retention.interval_hours.saturating_mul(3600));
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;
        // Failures are logged inside the policy; the next tick retries
        let status = run_cleanup_with(&policy, &retention, Utc::now()).await;
        tracing::debug!(unit = %retention.unit, ?status, "Scheduled retention pass finished");
    }
}

fn write_units(
    config: &Config,
    config_path: Option<std::path::PathBuf>,
    args: UnitsArgs,
) -> Result<(), AnyError> {
    let executable = match args.executable {
        Some(path) => path,
        None => std::env::current_exe()?,
    };
    let options = UnitOptions {
        executable,
        config_path,
    };

    let rendered = units::render(config, &options);
    for path in units::write_units(&args.out, &rendered)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn print_config(config: &Config) -> Result<(), AnyError> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
