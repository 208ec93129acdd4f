//! Account-Crawler main entry point
//!
//! This is the command-line interface for the segmented account crawler.

use account_crawler::config::{load_config_with_hash, validate_segment_count, Config};
use account_crawler::crawler::{crawl, partition};
use account_crawler::output::{print_report, InMemoryMetrics};
use account_crawler::stop::{ManualStopTrigger, StopTrigger};
use account_crawler::CrawlError;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Account-Crawler: a segmented parallel crawler over the account store
///
/// Splits the account table into segments, scans them concurrently and
/// processes every account exactly once. The crawl can be stopped early via
/// the configured control port, a stop file, or Ctrl+C.
#[derive(Parser, Debug)]
#[command(name = "account-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A segmented parallel account crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Number of segments to split the scan into (overrides crawler.segments)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    segments: Option<i64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the segment plan without crawling
    #[arg(long)]
    dry_run: bool,
}

/// Exit status for a crawl that ran and failed
const EXIT_FAILED: u8 = 1;

/// Exit status for a configuration error
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let segments = cli.segments.unwrap_or(config.crawler.segments);
    if let Err(e) = validate_segment_count(segments) {
        tracing::error!("Invalid --segments: {}", e);
        return ExitCode::from(EXIT_CONFIG);
    }

    if cli.dry_run {
        return handle_dry_run(&config, segments);
    }

    handle_crawl(config, segments).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("account_crawler=info,warn"),
            1 => EnvFilter::new("account_crawler=debug,info"),
            2 => EnvFilter::new("account_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the segment plan
fn handle_dry_run(config: &Config, segments: i64) -> ExitCode {
    let plan = match partition(segments) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    println!("=== Account-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Segments: {}", plan.len());
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Fail fast: {}", config.crawler.fail_fast);
    println!(
        "  Dispatch concurrency: {}",
        config.crawler.dispatch_concurrency
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms doubling up to {}ms (+{}% jitter)",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.jitter_percent
    );

    println!("\nStore:");
    println!("  Database: {}", config.store.database_path);
    println!("  Pool size: {}", config.store.pool_size);

    println!("\nStop Listener:");
    match config.stop_listener.port {
        Some(port) => println!("  Control port: {}:{}", config.stop_listener.bind_address, port),
        None => println!("  Control port: disabled"),
    }
    match &config.stop_listener.stop_file {
        Some(path) => println!("  Stop file: {}", path.display()),
        None => println!("  Stop file: disabled"),
    }

    let effective = config.crawler.max_concurrency.min(plan.len());
    println!("\n✓ Configuration is valid");
    if config.store.pool_size < effective {
        println!(
            "✗ Pool size {} is below effective concurrency {}; the crawl would be rejected",
            config.store.pool_size, effective
        );
        return ExitCode::from(EXIT_CONFIG);
    }
    println!(
        "✓ Would scan {} segments with up to {} in flight",
        plan.len(),
        effective
    );

    ExitCode::SUCCESS
}

/// Wires Ctrl+C to a manual stop trigger; a second Ctrl+C exits immediately
fn ctrl_c_trigger() -> Arc<ManualStopTrigger> {
    let trigger = Arc::new(ManualStopTrigger::new());
    let handle = trigger.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, finishing in-flight pages (press again to force quit)");
            handle.trigger();

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::error!("Force quit requested, exiting immediately");
                std::process::exit(i32::from(EXIT_FAILED));
            }
        }
    });

    trigger
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, segments: i64) -> ExitCode {
    tracing::info!(
        "Starting crawl of {} with concurrency {}",
        config.store.database_path,
        config.crawler.max_concurrency
    );

    let metrics = Arc::new(InMemoryMetrics::new());
    let interrupt: Arc<dyn StopTrigger> = ctrl_c_trigger();

    match crawl(&config, segments, vec![interrupt], metrics.clone()).await {
        Ok(report) => {
            print_report(&report);
            let snapshot = metrics.snapshot();
            tracing::debug!(
                "Metrics: {} dispatched, {} errors",
                snapshot.dispatched,
                snapshot.total_errors()
            );

            if report.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILED)
            }
        }
        Err(CrawlError::Config(e)) => {
            tracing::error!("Configuration error: {}", e);
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
