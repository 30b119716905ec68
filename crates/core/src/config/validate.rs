use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Source timeout is not 0
/// - Reader session idle timeout is not 0
/// - At least one source is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.sources.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sources.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.reader.session_idle_secs == 0 {
        return Err(ConfigError::ValidationError(
            "reader.session_idle_secs cannot be 0".to_string(),
        ));
    }

    if !config.sources.novelfire.enabled && !config.sources.royalroad.enabled {
        return Err(ConfigError::ValidationError(
            "at least one source must be enabled".to_string(),
        ));
    }

    Ok(())
}
