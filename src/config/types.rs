use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the account crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub store: StoreConfig,
    #[serde(rename = "stop-listener", default)]
    pub stop_listener: StopListenerConfig,
}

/// Crawl fan-out and flow control
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of segments the key space is split into
    ///
    /// Signed so that a bad value reaches validation instead of failing in
    /// the TOML parser with a less useful message.
    #[serde(default = "default_segments")]
    pub segments: i64,

    /// Maximum number of segment tasks scanning at the same time
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Records requested per page fetch
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Whether a fatal store error in one segment stops every other segment
    #[serde(rename = "fail-fast", default)]
    pub fail_fast: bool,

    /// Capacity of the channel between segment tasks and the dispatcher
    #[serde(rename = "record-buffer", default = "default_record_buffer")]
    pub record_buffer: usize,

    /// Maximum number of processor invocations in flight
    #[serde(rename = "dispatch-concurrency", default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,
}

/// Backoff policy for retryable store errors
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random jitter added on top of each delay, as a percentage of it
    #[serde(rename = "jitter-percent", default = "default_jitter_percent")]
    pub jitter_percent: u64,
}

/// Account store connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite accounts database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Number of pooled read connections
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,
}

/// External stop trigger settings
#[derive(Debug, Clone, Deserialize)]
pub struct StopListenerConfig {
    /// How often the monitor polls its triggers (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(rename = "bind-address", default = "default_bind_address")]
    pub bind_address: String,

    /// TCP control port; a connection sending `stop` aborts the crawl
    #[serde(default)]
    pub port: Option<u16>,

    /// Sentinel file; its appearance aborts the crawl
    #[serde(rename = "stop-file", default)]
    pub stop_file: Option<PathBuf>,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl StopListenerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            segments: default_segments(),
            max_concurrency: default_max_concurrency(),
            page_size: default_page_size(),
            fail_fast: false,
            record_buffer: default_record_buffer(),
            dispatch_concurrency: default_dispatch_concurrency(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_percent: default_jitter_percent(),
        }
    }
}

impl Default for StopListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            bind_address: default_bind_address(),
            port: None,
            stop_file: None,
        }
    }
}

fn default_segments() -> i64 {
    1
}

fn default_max_concurrency() -> usize {
    8
}

fn default_page_size() -> u32 {
    500
}

fn default_record_buffer() -> usize {
    1024
}

fn default_dispatch_concurrency() -> usize {
    16
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter_percent() -> u64 {
    10
}

fn default_pool_size() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
