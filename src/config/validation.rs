use super::models::{Config, SupervisorConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Retention window must be at least 1 day, got {0}")]
    InvalidRetentionWindow(u32),

    #[error("Retention unit must not be empty")]
    EmptyRetentionUnit,

    #[error("Retention interval must be at least 1 hour")]
    InvalidRetentionInterval,

    #[error("Worker program must not be empty")]
    EmptyWorkerProgram,

    #[error("Worker name must not be empty")]
    EmptyWorkerName,

    #[error(
        "max_restart_delay_seconds ({max}) is lower than restart_delay_seconds ({base})"
    )]
    RestartDelayCeiling { base: u64, max: u64 },

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidEnvValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_retention(config)?;
    validate_worker(config)?;
    validate_supervisor(&config.supervisor)?;
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    let retention = &config.retention;

    if retention.window_days < 1 {
        return Err(ValidationError::InvalidRetentionWindow(retention.window_days));
    }

    if retention.unit.trim().is_empty() {
        return Err(ValidationError::EmptyRetentionUnit);
    }

    if retention.interval_hours == 0 {
        return Err(ValidationError::InvalidRetentionInterval);
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.name.trim().is_empty() {
        return Err(ValidationError::EmptyWorkerName);
    }

    if config.worker.program.as_os_str().is_empty() {
        return Err(ValidationError::EmptyWorkerProgram);
    }

    Ok(())
}

fn validate_supervisor(supervisor: &SupervisorConfig) -> Result<(), ValidationError> {
    if supervisor.max_restart_delay_seconds < supervisor.restart_delay_seconds {
        return Err(ValidationError::RestartDelayCeiling {
            base: supervisor.restart_delay_seconds,
            max: supervisor.max_restart_delay_seconds,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = Config::default();
        config.retention.window_days = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidRetentionWindow(0))
        ));
    }

    #[test]
    fn test_blank_unit_rejected() {
        let mut config = Config::default();
        config.retention.unit = "  ".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyRetentionUnit)
        ));
    }

    #[test]
    fn test_empty_program_rejected() {
        let mut config = Config::default();
        config.worker.program = PathBuf::new();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyWorkerProgram)
        ));
    }

    #[test]
    fn test_backoff_ceiling_below_base_rejected() {
        let mut config = Config::default();
        config.supervisor.restart_delay_seconds = 30;
        config.supervisor.max_restart_delay_seconds = 10;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::RestartDelayCeiling { base: 30, max: 10 })
        ));
    }
}
