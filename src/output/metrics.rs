//! Metrics sinks
//!
//! The orchestrator pushes a handful of numbers at the end of each run. Sinks
//! are fire-and-forget: they cannot fail the crawl.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Receiver for crawl metrics
pub trait MetricsSink: Send + Sync {
    /// Wall-clock duration of the run
    fn record_duration(&self, duration: Duration);

    /// Records successfully handed to the processor
    fn record_dispatched(&self, count: u64);

    /// Errors of one kind such as `timeout` or `processing`
    fn record_error(&self, kind: &str, count: u64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_duration(&self, _duration: Duration) {}

    fn record_dispatched(&self, _count: u64) {}

    fn record_error(&self, _kind: &str, _count: u64) {}
}

/// Point-in-time copy of an `InMemoryMetrics`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub duration: Option<Duration>,
    pub dispatched: u64,
    pub errors: HashMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn total_errors(&self) -> u64 {
        self.errors.values().sum()
    }
}

/// Accumulates metrics in memory; used by the binary's final report and by tests
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with(|m| m.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut MetricsSnapshot) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_duration(&self, duration: Duration) {
        self.with(|m| m.duration = Some(duration));
    }

    fn record_dispatched(&self, count: u64) {
        self.with(|m| m.dispatched += count);
    }

    fn record_error(&self, kind: &str, count: u64) {
        self.with(|m| *m.errors.entry(kind.to_string()).or_insert(0) += count);
    }
}
