use super::models::{Config, RestartPolicy};
use super::validation::ValidationError;
use super::ConfigError;
use config::{Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "VITALSD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/vitalsd.toml";
const ENV_PREFIX: &str = "VITALSD";
const ENV_SEPARATOR: &str = "__";

/// Flat keys understood by the deployment scripts this daemon replaces
pub const LOG_RETENTION_DAYS: &str = "LOG_RETENTION_DAYS";
pub const RESTART_POLICY: &str = "RESTART_POLICY";
pub const RESTART_DELAY_SECONDS: &str = "RESTART_DELAY_SECONDS";
pub const DEBUG_MODE: &str = "DEBUG_MODE";

/// Resolve the configuration file path from an explicit flag or `VITALSD_CONFIG`
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. `VITALSD__SECTION__KEY` environment variables
/// 4. Flat legacy keys (`LOG_RETENTION_DAYS`, `RESTART_POLICY`, ...)
///
/// A `.env` file in the working directory is loaded first so its values
/// take part in steps 3 and 4.
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path(explicit))?;
    apply_legacy_overrides(&mut config, |key| env::var(key).ok())?;

    Ok(config)
}

/// Load configuration from a specific path and the `VITALSD__*` environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // VITALSD__RETENTION__WINDOW_DAYS -> retention.window_days
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

/// Apply the flat environment keys on top of an already loaded config.
///
/// Values that are present but malformed are errors; absent keys leave the
/// config untouched, so an unset `LOG_RETENTION_DAYS` keeps the default of 7.
pub fn apply_legacy_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(LOG_RETENTION_DAYS) {
        config.retention.window_days = parse_integer(LOG_RETENTION_DAYS, &raw)?;
    }

    if let Some(raw) = lookup(RESTART_POLICY) {
        config.supervisor.restart =
            raw.parse::<RestartPolicy>()
                .map_err(|reason| ValidationError::InvalidEnvValue {
                    key: RESTART_POLICY.to_string(),
                    value: raw.clone(),
                    reason,
                })?;
    }

    if let Some(raw) = lookup(RESTART_DELAY_SECONDS) {
        config.supervisor.restart_delay_seconds = parse_integer(RESTART_DELAY_SECONDS, &raw)?;
    }

    if let Some(raw) = lookup(DEBUG_MODE) {
        config.telemetry.debug = matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        );
    }

    Ok(())
}

fn parse_integer<T>(key: &str, raw: &str) -> Result<T, ValidationError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ValidationError::InvalidEnvValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
