//! Shared cooperative cancellation signal
//!
//! A `CancellationSignal` starts out `Running` and can be moved to
//! `StopRequested` exactly once. It never reverts. Scan tasks poll it before
//! every fetch and can also await it while sleeping between retries.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The two values a cancellation signal can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Running,
    StopRequested,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::StopRequested => write!(f, "stop-requested"),
        }
    }
}

/// Cloneable handle to one shared, monotonic stop flag
///
/// Wraps a `CancellationToken`; the extra flag only decides which caller
/// made the transition.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Creates a signal in the `Running` state
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Moves the signal to `StopRequested`
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// repeated detections of the same trigger are harmless.
    pub fn request_stop(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> SignalState {
        if self.is_stop_requested() {
            SignalState::StopRequested
        } else {
            SignalState::Running
        }
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
