//! Stop triggers
//!
//! A trigger is an out-of-band source of "please stop" requests. The monitor
//! starts every trigger before the scan, polls them while it runs and stops
//! them afterwards.

use crate::CrawlError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// An external abort source watched by the `StopSignalMonitor`
#[async_trait]
pub trait StopTrigger: Send + Sync {
    /// Short label used in log lines
    fn name(&self) -> &str;

    /// Acquires whatever the trigger listens on
    ///
    /// A stop requested during an earlier run does not carry over.
    async fn start(&self) -> Result<(), CrawlError>;

    /// Whether a stop has been requested through this trigger
    async fn is_triggered(&self) -> bool;

    /// Releases the trigger's resources; safe to call more than once
    fn stop(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Trips when `trigger()` is called
///
/// The binary wires Ctrl+C to one of these. A request made before `start()`
/// is kept; `stop()` clears it.
#[derive(Debug, Default)]
pub struct ManualStopTrigger {
    tripped: AtomicBool,
}

impl ManualStopTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StopTrigger for ManualStopTrigger {
    fn name(&self) -> &str {
        "manual"
    }

    async fn start(&self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn is_triggered(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }
}

/// Trips once a sentinel file exists
#[derive(Debug)]
pub struct FileStopTrigger {
    path: PathBuf,
}

impl FileStopTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StopTrigger for FileStopTrigger {
    fn name(&self) -> &str {
        "stop-file"
    }

    async fn start(&self) -> Result<(), CrawlError> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tracing::warn!(
                "Stop file {} already exists; the crawl will stop at the first poll",
                self.path.display()
            );
        } else {
            tracing::info!("Watching for stop file: {}", self.path.display());
        }
        Ok(())
    }

    async fn is_triggered(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn stop(&self) {}
}

/// Trips when a client connects to the control port and sends `stop`
///
/// A client that connects and closes without sending anything also trips it.
/// Other lines are ignored.
pub struct TcpStopTrigger {
    bind: String,
    tripped: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpStopTrigger {
    /// Creates a trigger that will listen on `bind` (`host:port`) once started
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            tripped: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
            accept_task: Mutex::new(None),
        }
    }

    /// Address actually bound, available after `start()`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    /// Accepts control connections until aborted
    ///
    /// Connection handlers live in a `JoinSet` owned by this task, so aborting
    /// the loop also drops every open control connection.
    async fn accept_loop(listener: TcpListener, tripped: Arc<AtomicBool>) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("Stop listener connection from {}", peer);
                        connections.spawn(Self::handle_connection(stream, tripped.clone()));
                    }
                    Err(e) => {
                        tracing::warn!("Stop listener accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }

    async fn handle_connection(stream: TcpStream, tripped: Arc<AtomicBool>) {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("stop") => break,
                Ok(Some(line)) => {
                    tracing::debug!("Ignoring stop listener input: {:?}", line.trim());
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Stop listener read failed: {}", e);
                    return;
                }
            }
        }
        tracing::info!("Stop command received on control port");
        tripped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StopTrigger for TcpStopTrigger {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn start(&self) -> Result<(), CrawlError> {
        let listener = TcpListener::bind(&self.bind).await.map_err(|e| {
            CrawlError::StopListener(format!("Failed to bind {}: {}", self.bind, e))
        })?;
        let addr = listener.local_addr()?;
        tracing::info!("Stop listener accepting connections on {}", addr);

        *lock(&self.local_addr) = Some(addr);
        self.tripped.store(false, Ordering::SeqCst);
        let task = tokio::spawn(Self::accept_loop(listener, self.tripped.clone()));
        if let Some(previous) = lock(&self.accept_task).replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn is_triggered(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if let Some(task) = lock(&self.accept_task).take() {
            task.abort();
            tracing::debug!("Stop listener on {} closed", self.bind);
        }
        self.tripped.store(false, Ordering::SeqCst);
    }
}

impl Drop for TcpStopTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}
