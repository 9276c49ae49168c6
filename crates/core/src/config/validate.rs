use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Both timeout tiers are non-zero
/// - Diagnostic limit is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.engine.document_timeout_secs == 0 || config.engine.media_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine timeouts must be greater than 0".to_string(),
        ));
    }

    if config.engine.diagnostic_limit == 0 {
        return Err(ConfigError::ValidationError(
            "engine.diagnostic_limit cannot be 0".to_string(),
        ));
    }

    Ok(())
}
