//! Stop signal monitor
//!
//! Watches a set of triggers for the duration of a crawl and raises the
//! shared `CancellationSignal` when any of them trips.

use crate::state::CancellationSignal;
use crate::stop::StopTrigger;
use crate::CrawlError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Lifecycle of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Inactive,
    Watching,
    Triggered,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorState::Inactive => "inactive",
            MonitorState::Watching => "watching",
            MonitorState::Triggered => "triggered",
        };
        write!(f, "{}", s)
    }
}

/// Background watcher bridging stop triggers to a `CancellationSignal`
pub struct StopSignalMonitor {
    triggers: Vec<Arc<dyn StopTrigger>>,
    poll_interval: Duration,
    signal: CancellationSignal,
    state: Arc<watch::Sender<MonitorState>>,
}

impl StopSignalMonitor {
    pub fn new(poll_interval: Duration, signal: CancellationSignal) -> Self {
        let (state, _rx) = watch::channel(MonitorState::Inactive);
        Self {
            triggers: Vec::new(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            signal,
            state: Arc::new(state),
        }
    }

    pub fn add_trigger(&mut self, trigger: Arc<dyn StopTrigger>) {
        self.triggers.push(trigger);
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Starts every trigger and the polling task
    ///
    /// If a trigger fails to start, the ones already started are stopped
    /// again and the error is returned.
    ///
    /// # Returns
    ///
    /// * `Ok(MonitorGuard)` - Watching; call `stop()` on the guard when the scan ends
    /// * `Err(CrawlError)` - A trigger could not be started
    pub async fn start(&self) -> Result<MonitorGuard, CrawlError> {
        for (i, trigger) in self.triggers.iter().enumerate() {
            if let Err(e) = trigger.start().await {
                tracing::error!("Failed to start stop trigger {}: {}", trigger.name(), e);
                for started in &self.triggers[..i] {
                    started.stop();
                }
                return Err(e);
            }
        }

        self.state.send_replace(MonitorState::Watching);

        let task = if self.triggers.is_empty() {
            None
        } else {
            Some(tokio::spawn(poll_triggers(
                self.triggers.clone(),
                self.poll_interval,
                self.signal.clone(),
                self.state.clone(),
            )))
        };

        tracing::debug!(
            "Stop monitor watching {} trigger(s) every {:?}",
            self.triggers.len(),
            self.poll_interval
        );

        Ok(MonitorGuard {
            task,
            triggers: self.triggers.clone(),
            state: self.state.clone(),
            stopped: false,
        })
    }
}

async fn poll_triggers(
    triggers: Vec<Arc<dyn StopTrigger>>,
    poll_interval: Duration,
    signal: CancellationSignal,
    state: Arc<watch::Sender<MonitorState>>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        for trigger in &triggers {
            if trigger.is_triggered().await {
                if signal.request_stop() {
                    tracing::warn!("Stop requested by {} trigger", trigger.name());
                }
                state.send_replace(MonitorState::Triggered);
                return;
            }
        }
    }
}

/// Scoped handle on a running monitor
///
/// Dropping the guard without calling `stop()` aborts the polling task and
/// stops the triggers.
pub struct MonitorGuard {
    task: Option<JoinHandle<()>>,
    triggers: Vec<Arc<dyn StopTrigger>>,
    state: Arc<watch::Sender<MonitorState>>,
    stopped: bool,
}

impl MonitorGuard {
    /// Stops polling, waits for the polling task and releases the triggers
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("Stop monitor task panicked: {}", e);
                }
            }
        }
        self.release();
    }

    fn release(&mut self) {
        if self.stopped {
            return;
        }
        for trigger in &self.triggers {
            trigger.stop();
        }
        self.state.send_replace(MonitorState::Inactive);
        self.stopped = true;
        tracing::debug!("Stop monitor inactive");
    }
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.release();
    }
}
