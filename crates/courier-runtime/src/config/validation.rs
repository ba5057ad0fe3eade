//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    CourierConfig, DispatchConfig, LogOutput, LoggingConfig, MIN_ERROR_BACKOFF_MS, PollerConfig,
};

/// Largest batch the Bot API accepts.
pub const MAX_LIMIT: u32 = 100;

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_poller_config(&config.poller)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates long-poll settings.
pub fn validate_poller_config(poller: &PollerConfig) -> ConfigResult<()> {
    if poller.limit == 0 || poller.limit > MAX_LIMIT {
        return Err(ConfigError::validation(format!(
            "poller.limit must be between 1 and {MAX_LIMIT}, got {}",
            poller.limit
        )));
    }

    if poller.buffer_size == 0 {
        return Err(ConfigError::validation(
            "poller.buffer_size must be greater than 0",
        ));
    }

    if poller.error_backoff_ms < MIN_ERROR_BACKOFF_MS {
        return Err(ConfigError::validation(format!(
            "poller.error_backoff_ms must be at least {MIN_ERROR_BACKOFF_MS}, got {}",
            poller.error_backoff_ms
        )));
    }

    if !poller.backoff_multiplier.is_finite() || poller.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "poller.backoff_multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

/// Validates dispatch settings.
pub fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.workers == 0 {
        return Err(ConfigError::validation(
            "dispatch.workers must be greater than 0",
        ));
    }
    Ok(())
}

/// Validates logging settings.
pub fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn test_limit_bounds() {
        let mut config = CourierConfig::default();
        config.poller.limit = 0;
        assert!(validate_config(&config).is_err());
        config.poller.limit = 101;
        assert!(validate_config(&config).is_err());
        config.poller.limit = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = CourierConfig::default();
        config.dispatch.workers = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("dispatch.workers"));
    }

    #[test]
    fn test_shrinking_backoff_rejected() {
        let mut config = CourierConfig::default();
        config.poller.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_error_backoff_rejected() {
        let mut config = CourierConfig::default();
        config.poller.error_backoff_ms = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("poller.error_backoff_ms"));

        config.poller.error_backoff_ms = MIN_ERROR_BACKOFF_MS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("bot.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
