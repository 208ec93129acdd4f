//! Stop listener module
//!
//! This module handles:
//! - The `StopTrigger` contract and its TCP, file and manual implementations
//! - The `StopSignalMonitor` that polls triggers while a crawl runs
//! - Building triggers from the `[stop-listener]` configuration

mod monitor;
mod trigger;

pub use monitor::{MonitorGuard, MonitorState, StopSignalMonitor};
pub use trigger::{FileStopTrigger, ManualStopTrigger, StopTrigger, TcpStopTrigger};

use crate::config::StopListenerConfig;
use std::sync::Arc;

/// Builds the stop triggers enabled in the configuration
///
/// A TCP trigger is created when `port` is set and a file trigger when
/// `stop-file` is set. Neither is started here.
pub fn triggers_from_config(config: &StopListenerConfig) -> Vec<Arc<dyn StopTrigger>> {
    let mut triggers: Vec<Arc<dyn StopTrigger>> = Vec::new();

    if let Some(port) = config.port {
        triggers.push(Arc::new(TcpStopTrigger::new(format!(
            "{}:{}",
            config.bind_address, port
        ))));
    }

    if let Some(path) = &config.stop_file {
        triggers.push(Arc::new(FileStopTrigger::new(path.clone())));
    }

    triggers
}
