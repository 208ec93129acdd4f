//! Integration tests for the crawler
//!
//! These tests drive full crawls against the in-memory store and a real
//! SQLite database, including stop triggers and failure handling.

use account_crawler::config::{
    Config, CrawlerConfig, RetryConfig, StopListenerConfig, StoreConfig,
};
use account_crawler::crawler::{crawl, CrawlOrchestrator, CrawlSettings, RetryPolicy};
use account_crawler::output::{InMemoryMetrics, NoopMetrics};
use account_crawler::state::{CrawlStatus, SegmentStatus};
use account_crawler::stop::{ManualStopTrigger, StopTrigger, TcpStopTrigger};
use account_crawler::storage::{Account, InMemoryAccountStore, SqliteAccountStore, StoreError};
use account_crawler::{ConfigError, CrawlError, RecordProcessor};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Creates a test configuration pointing at the given database
fn create_test_config(db_path: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrency: 4,
            page_size: 100,
            ..CrawlerConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_percent: 0,
        },
        store: StoreConfig {
            database_path: db_path.display().to_string(),
            pool_size: 4,
        },
        stop_listener: StopListenerConfig {
            poll_interval_ms: 10,
            ..StopListenerConfig::default()
        },
    }
}

fn create_test_settings() -> CrawlSettings {
    CrawlSettings {
        concurrency_limit: 4,
        retry: RetryPolicy::new(4, Duration::from_millis(1)),
        poll_interval: Duration::from_millis(10),
        ..CrawlSettings::default()
    }
}

/// Creates an accounts database with `count` rows
fn create_account_db(dir: &TempDir, count: usize) -> std::path::PathBuf {
    let path = dir.path().join("accounts.db");
    SqliteAccountStore::create(&path).expect("Failed to create database");

    let mut conn = Connection::open(&path).expect("Failed to open database");
    let tx = conn.transaction().expect("Failed to start transaction");
    for i in 0..count {
        tx.execute(
            "INSERT INTO accounts (uuid, number, version) VALUES (?1, ?2, ?3)",
            params![format!("uuid-{:06}", i), format!("+1555{:07}", i), 1],
        )
        .expect("Failed to insert account");
    }
    tx.commit().expect("Failed to commit");
    path
}

/// Processor that remembers every key it sees
fn collecting_processor() -> (Arc<dyn RecordProcessor<Account>>, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let processor = Arc::new(move |account: &Account| -> anyhow::Result<()> {
        sink.lock().unwrap().push(account.uuid.clone());
        Ok(())
    });
    (processor, seen)
}

#[tokio::test]
async fn test_full_crawl_dispatches_each_record_once() {
    let store = Arc::new(InMemoryAccountStore::with_generated(10_000).with_page_size(250));
    let orchestrator = CrawlOrchestrator::new(store.clone(), create_test_settings());
    let (processor, seen) = collecting_processor();

    let report = orchestrator.run(4, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.records_dispatched, 10_000);
    assert_eq!(report.completed_segments().len(), 4);

    let seen = seen.lock().unwrap();
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(seen.len(), 10_000);
    assert_eq!(unique.len(), 10_000);
    assert!(store.peak_concurrency() <= 4);
}

#[tokio::test]
async fn test_full_crawl_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let db_path = create_account_db(&dir, 10_000);
    let config = create_test_config(&db_path);
    let metrics = Arc::new(InMemoryMetrics::new());

    let report = crawl(&config, 4, vec![], metrics.clone()).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.records_dispatched, 10_000);
    assert_eq!(
        report.segments.iter().map(|o| o.records).sum::<u64>(),
        10_000
    );
    assert_eq!(metrics.snapshot().dispatched, 10_000);
}

#[tokio::test]
async fn test_default_single_segment() {
    let store = Arc::new(InMemoryAccountStore::with_generated(300).with_page_size(7));
    let settings = CrawlSettings {
        dispatch_concurrency: 1,
        ..create_test_settings()
    };
    let orchestrator = CrawlOrchestrator::new(store, settings);
    let (processor, seen) = collecting_processor();

    let report = orchestrator
        .run(CrawlerConfig::default().segments, processor)
        .await
        .unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.segment_total, 1);

    let seen = seen.lock().unwrap();
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(*seen, sorted);
}

#[tokio::test]
async fn test_invalid_segment_count_is_config_error() {
    let store = Arc::new(InMemoryAccountStore::with_generated(100));
    let (processor, _) = collecting_processor();

    for bad in [0, -3, i64::from(u32::MAX) + 1] {
        let orchestrator = CrawlOrchestrator::new(store.clone(), create_test_settings());
        let err = orchestrator.run(bad, processor.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            CrawlError::Config(ConfigError::InvalidSegmentCount { .. })
        ));
    }
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn test_invalid_segment_count_checked_before_store() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir.path().join("missing.db"));

    let err = crawl(&config, 0, vec![], Arc::new(NoopMetrics))
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Config(_)));

    let err = crawl(&config, 2, vec![], Arc::new(NoopMetrics))
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Store(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_pool_smaller_than_concurrency_rejected() {
    let dir = TempDir::new().unwrap();
    let db_path = create_account_db(&dir, 10);
    let mut config = create_test_config(&db_path);
    config.store.pool_size = 2;
    config.crawler.max_concurrency = 8;

    let err = crawl(&config, 4, vec![], Arc::new(NoopMetrics))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CrawlError::Config(ConfigError::PoolTooSmall {
            pool: 2,
            concurrency: 4
        })
    ));
}

#[tokio::test]
async fn test_transient_errors_are_absorbed() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(1_000)
            .with_page_size(50)
            .fail_page(1, 0, StoreError::Timeout("slow".to_string()), 2)
            .fail_page(2, 1, StoreError::Throttled("busy".to_string()), 1),
    );
    let metrics = Arc::new(InMemoryMetrics::new());
    let orchestrator =
        CrawlOrchestrator::new(store, create_test_settings()).with_metrics(metrics.clone());
    let (processor, seen) = collecting_processor();

    let report = orchestrator.run(4, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.total_retries(), 3);
    assert_eq!(seen.lock().unwrap().len(), 1_000);
    assert_eq!(metrics.snapshot().errors.get("transient"), Some(&3));
}

#[tokio::test]
async fn test_retry_cap_fails_segment() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(200)
            .with_page_size(50)
            .fail_page(0, 0, StoreError::Throttled("busy".to_string()), usize::MAX),
    );
    let orchestrator = CrawlOrchestrator::new(store.clone(), create_test_settings());
    let (processor, _) = collecting_processor();

    let report = orchestrator.run(1, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Failed);
    assert_eq!(store.fetch_count(), 4);
    match &report.failed_segments()[0].status {
        SegmentStatus::Failed(StoreError::RetriesExhausted { attempts, last }) => {
            assert_eq!(*attempts, 4);
            assert!(matches!(**last, StoreError::Throttled(_)));
        }
        other => panic!("unexpected segment status: {}", other),
    }
}

#[tokio::test]
async fn test_fatal_error_without_fail_fast_lets_siblings_finish() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(2_000)
            .with_page_size(20)
            .fail_page(0, 0, StoreError::PermissionDenied("denied".to_string()), usize::MAX),
    );
    let settings = CrawlSettings {
        concurrency_limit: 1,
        ..create_test_settings()
    };
    let orchestrator = CrawlOrchestrator::new(store, settings);
    let (processor, _) = collecting_processor();

    let report = orchestrator.run(4, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Failed);
    assert_eq!(report.failed_segments().len(), 1);
    assert_eq!(report.completed_segments().len(), 3);
    assert_eq!(report.cancelled_segments(), 0);
}

#[tokio::test]
async fn test_fatal_error_with_fail_fast_cancels_queued_segments() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(2_000)
            .with_page_size(20)
            .fail_page(0, 0, StoreError::PermissionDenied("denied".to_string()), usize::MAX),
    );
    let settings = CrawlSettings {
        concurrency_limit: 1,
        fail_fast: true,
        ..create_test_settings()
    };
    let orchestrator = CrawlOrchestrator::new(store, settings);
    let (processor, seen) = collecting_processor();

    let report = orchestrator.run(4, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Failed);
    assert_eq!(report.failed_segments().len(), 1);
    assert_eq!(report.cancelled_segments(), 3);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_processing_failure_fails_crawl() {
    let store = Arc::new(InMemoryAccountStore::with_generated(3_000).with_page_size(25));
    let orchestrator = CrawlOrchestrator::new(store, create_test_settings());
    let processor: Arc<dyn RecordProcessor<Account>> =
        Arc::new(|account: &Account| -> anyhow::Result<()> {
            if account.uuid == "acct-00001234" {
                anyhow::bail!("number format rejected");
            }
            Ok(())
        });

    let report = orchestrator.run(3, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::Failed);
    let err = report.processing_error.as_ref().unwrap();
    assert_eq!(err.key, "acct-00001234");
    assert!(err.to_string().contains("number format rejected"));
}

#[tokio::test]
async fn test_manual_stop_yields_partial_results() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(10_000)
            .with_page_size(10)
            .with_latency(Duration::from_millis(5)),
    );
    let trigger = Arc::new(ManualStopTrigger::new());
    let orchestrator =
        CrawlOrchestrator::new(store, create_test_settings()).with_trigger(trigger.clone());

    let count = Arc::new(AtomicU64::new(0));
    let counter = count.clone();
    let fire = trigger.clone();
    let processor: Arc<dyn RecordProcessor<Account>> =
        Arc::new(move |_: &Account| -> anyhow::Result<()> {
            if counter.fetch_add(1, Ordering::SeqCst) == 200 {
                fire.trigger();
            }
            Ok(())
        });

    let report = orchestrator.run(4, processor).await.unwrap();

    assert_eq!(report.status, CrawlStatus::CompletedPartial);
    assert!(report.stop_requested);
    assert!(report.records_dispatched < 10_000);
    assert_eq!(report.records_dispatched, count.load(Ordering::SeqCst));
    assert!(report.status.is_success());
}

#[tokio::test]
async fn test_direct_cancellation_yields_partial_results() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(10_000)
            .with_page_size(10)
            .with_latency(Duration::from_millis(5)),
    );
    let orchestrator = CrawlOrchestrator::new(store, create_test_settings());
    let signal = orchestrator.cancellation();
    let (processor, _) = collecting_processor();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.request_stop();
    });

    let report = orchestrator.run(4, processor).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(report.status, CrawlStatus::CompletedPartial);
    assert!(report.records_dispatched < 10_000);
    assert!(report.failed_segments().is_empty());
}

#[tokio::test]
async fn test_stop_file_aborts_crawl() {
    let dir = TempDir::new().unwrap();
    let db_path = create_account_db(&dir, 5_000);
    let stop_file = dir.path().join("crawl.stop");
    std::fs::write(&stop_file, b"").unwrap();

    let mut config = create_test_config(&db_path);
    config.crawler.page_size = 10;
    config.stop_listener.stop_file = Some(stop_file);

    let report = crawl(&config, 4, vec![], Arc::new(NoopMetrics))
        .await
        .unwrap();

    assert!(report.stop_requested);
    assert_eq!(report.status, CrawlStatus::CompletedPartial);
    assert!(report.records_dispatched < 5_000);
}

#[tokio::test]
async fn test_tcp_stop_command_aborts_crawl() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(20_000)
            .with_page_size(10)
            .with_latency(Duration::from_millis(5)),
    );
    let trigger = Arc::new(TcpStopTrigger::new("127.0.0.1:0"));
    let orchestrator = CrawlOrchestrator::new(store, create_test_settings())
        .with_trigger(trigger.clone() as Arc<dyn StopTrigger>);
    let (processor, _) = collecting_processor();

    let crawl = tokio::spawn(async move { orchestrator.run(4, processor).await });

    let addr = loop {
        if let Some(addr) = trigger.local_addr() {
            break addr;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"stop\n").await.unwrap();

    let report = crawl.await.unwrap().unwrap();
    assert_eq!(report.status, CrawlStatus::CompletedPartial);
    assert!(report.records_dispatched < 20_000);
}

#[tokio::test]
async fn test_crawl_resumes_cleanly_after_tcp_stop() {
    let store = Arc::new(
        InMemoryAccountStore::with_generated(5_000)
            .with_page_size(10)
            .with_latency(Duration::from_millis(2)),
    );
    let trigger = Arc::new(TcpStopTrigger::new("127.0.0.1:0"));
    let (processor, _) = collecting_processor();

    let orchestrator = CrawlOrchestrator::new(store.clone(), create_test_settings())
        .with_trigger(trigger.clone() as Arc<dyn StopTrigger>);
    let crawl = tokio::spawn(async move { orchestrator.run(4, processor).await });
    let addr = loop {
        if let Some(addr) = trigger.local_addr() {
            break addr;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"stop\n").await.unwrap();
    let stopped = crawl.await.unwrap().unwrap();
    assert_eq!(stopped.status, CrawlStatus::CompletedPartial);

    let (processor, seen) = collecting_processor();
    let report = CrawlOrchestrator::new(store, create_test_settings())
        .with_trigger(trigger.clone() as Arc<dyn StopTrigger>)
        .run(4, processor)
        .await
        .unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert!(!report.stop_requested);
    assert_eq!(report.records_dispatched, 5_000);
    assert_eq!(seen.lock().unwrap().len(), 5_000);
}
