use crate::config::types::{Config, CrawlerConfig, RetryConfig, StopListenerConfig, StoreConfig};
use crate::ConfigError;
use std::net::IpAddr;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_store_config(&config.store)?;
    validate_stop_listener_config(&config.stop_listener)?;
    Ok(())
}

/// Validates a segment count, whether it came from the file or the CLI
pub fn validate_segment_count(segments: i64) -> Result<u32, ConfigError> {
    u32::try_from(segments)
        .ok()
        .filter(|count| *count >= 1)
        .ok_or(ConfigError::InvalidSegmentCount { got: segments })
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_segment_count(config.segments)?;

    if config.max_concurrency < 1 || config.max_concurrency > 1024 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 1024, got {}",
            config.max_concurrency
        )));
    }

    if config.page_size < 1 || config.page_size > 10_000 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 10000, got {}",
            config.page_size
        )));
    }

    if config.record_buffer < 1 {
        return Err(ConfigError::Validation(
            "record_buffer must be >= 1".to_string(),
        ));
    }

    if config.dispatch_concurrency < 1 {
        return Err(ConfigError::Validation(
            "dispatch_concurrency must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    if config.jitter_percent > 100 {
        return Err(ConfigError::Validation(format!(
            "jitter_percent must be <= 100, got {}",
            config.jitter_percent
        )));
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.pool_size < 1 {
        return Err(ConfigError::Validation(format!(
            "pool_size must be >= 1, got {}",
            config.pool_size
        )));
    }

    Ok(())
}

/// Validates stop listener configuration
fn validate_stop_listener_config(config: &StopListenerConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    config.bind_address.parse::<IpAddr>().map_err(|e| {
        ConfigError::Validation(format!(
            "Invalid bind_address '{}': {}",
            config.bind_address, e
        ))
    })?;

    if let Some(path) = &config.stop_file {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "stop_file cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            crawler: CrawlerConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig {
                database_path: "./accounts.db".to_string(),
                pool_size: 8,
            },
            stop_listener: StopListenerConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_segment_count_bounds() {
        assert_eq!(validate_segment_count(1).unwrap(), 1);
        assert_eq!(validate_segment_count(64).unwrap(), 64);
        assert!(matches!(
            validate_segment_count(0),
            Err(ConfigError::InvalidSegmentCount { got: 0 })
        ));
        assert!(matches!(
            validate_segment_count(-3),
            Err(ConfigError::InvalidSegmentCount { got: -3 })
        ));
        assert!(validate_segment_count(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_invalid_segments_in_file() {
        let mut config = create_valid_config();
        config.crawler.segments = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidSegmentCount { .. })
        ));
    }

    #[test]
    fn test_invalid_max_concurrency() {
        let mut config = create_valid_config();
        config.crawler.max_concurrency = 0;
        assert!(validate(&config).is_err());

        config.crawler.max_concurrency = 1025;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_page_size() {
        let mut config = create_valid_config();
        config.crawler.page_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_retry_delays() {
        let mut config = create_valid_config();
        config.retry.base_delay_ms = 500;
        config.retry.max_delay_ms = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_max_attempts() {
        let mut config = create_valid_config();
        config.retry.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_jitter() {
        let mut config = create_valid_config();
        config.retry.jitter_percent = 150;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_database_path() {
        let mut config = create_valid_config();
        config.store.database_path = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = create_valid_config();
        config.stop_listener.bind_address = "not-an-ip".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_poll_interval_too_small() {
        let mut config = create_valid_config();
        config.stop_listener.poll_interval_ms = 1;
        assert!(validate(&config).is_err());
    }
}
