use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so operators can tell which configuration a long
/// running crawl was started with.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Loads a configuration and returns both the config and its hash
///
/// The file is read once, so the hash always matches the parsed content.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r#"
[crawler]
segments = 4
max-concurrency = 2
page-size = 250
fail-fast = true
record-buffer = 64
dispatch-concurrency = 4

[retry]
max-attempts = 3
base-delay-ms = 50
max-delay-ms = 2000
jitter-percent = 0

[store]
database-path = "./accounts.db"
pool-size = 4

[stop-listener]
poll-interval-ms = 250
port = 9099
stop-file = "/tmp/crawl.stop"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.segments, 4);
        assert_eq!(config.crawler.max_concurrency, 2);
        assert!(config.crawler.fail_fast);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.stop_listener.port, Some(9099));
        assert_eq!(config.stop_listener.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let config_content = r#"
[store]
database-path = "./accounts.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.segments, 1);
        assert!(!config.crawler.fail_fast);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.store.pool_size, 8);
        assert!(config.stop_listener.port.is_none());
        assert!(config.stop_listener.stop_file.is_none());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/crawler.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_negative_segments_rejected() {
        let config_content = r#"
[crawler]
segments = -2

[store]
database-path = "./accounts.db"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidSegmentCount { got: -2 }
        ));
    }

    #[test]
    fn test_hash_matches_loaded_content() {
        let config_content = r#"
[store]
database-path = "./accounts.db"
"#;
        let file = create_temp_config(config_content);

        let (_, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
