use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Concurrency limit is positive
/// - Upstream and destination base URLs are set
/// - Every timeout and retention window is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.batch.max_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "batch.max_concurrency must be a positive integer".to_string(),
        ));
    }

    if config.source.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "source.base_url cannot be empty".to_string(),
        ));
    }

    if config.uploader.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "uploader.base_url cannot be empty".to_string(),
        ));
    }

    let windows = [
        ("batch.batch_timeout_secs", config.batch.batch_timeout_secs),
        ("batch.retention_secs", config.batch.retention_secs),
        ("batch.reaper_interval_secs", config.batch.reaper_interval_secs),
        ("source.timeout_secs", config.source.timeout_secs),
        ("download.timeout_secs", config.download.timeout_secs),
        ("converter.timeout_secs", config.converter.timeout_secs),
        ("uploader.timeout_secs", config.uploader.timeout_secs),
    ];
    for (key, value) in windows {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", key)));
        }
    }

    Ok(())
}
