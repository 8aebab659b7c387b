//! Configuration management for vitalsd
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables, including a `.env` file in the working directory
//!
//! # Usage
//!
//! ```no_run
//! use vitalsd::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Retention window: {} days", config.retention.window_days);
//! ```
//!
//! # Environment Variables
//!
//! Any field can be overridden with `VITALSD__<section>__<key>`:
//! - `VITALSD__RETENTION__WINDOW_DAYS=14`
//! - `VITALSD__WORKER__WORKING_DIR=/opt/vitals`
//!
//! The flat keys used by the legacy deployment scripts are applied last:
//! `LOG_RETENTION_DAYS`, `RESTART_POLICY`, `RESTART_DELAY_SECONDS` and
//! `DEBUG_MODE`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/vitalsd.toml`.
//! This can be overridden using `--config` or the `VITALSD_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Backoff, BackendKind, Config, RestartPolicy, RetentionConfig, SupervisorConfig,
    TelemetryConfig, WorkerConfig,
};
pub use sources::{
    apply_legacy_overrides, config_path, DEBUG_MODE, LOG_RETENTION_DAYS, RESTART_DELAY_SECONDS,
    RESTART_POLICY,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Flat legacy keys (`LOG_RETENTION_DAYS`, ...)
    /// 2. Environment variables (`VITALSD__*`)
    /// 3. TOML file (`explicit`, else `VITALSD_CONFIG`, else `config/vitalsd.toml`)
    /// 4. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - A flat environment key holds an unparsable value
    /// - Validation fails (zero retention window, empty program, ...)
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(explicit)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, ignoring the flat legacy keys
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation, e.g. after applying overrides by hand
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
