//! Backend reachability monitoring.

use crate::api::ChatApi;
use log::{debug, info, warn};
use parking_lot::RwLock;
use parlor_protocol::{ChatEvent, ConnectivityStatus, EventSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shared, readable connectivity status.
#[derive(Debug, Clone, Default)]
pub struct StatusCell(Arc<RwLock<ConnectivityStatus>>);

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectivityStatus {
        *self.0.read()
    }

    /// Store a status, returning whether it differs from the previous one.
    pub fn set(&self, status: ConnectivityStatus) -> bool {
        let mut current = self.0.write();
        let changed = *current != status;
        *current = status;
        changed
    }
}

/// Background task handle; the task stops when the handle is dropped.
#[derive(Debug)]
pub struct MonitorHandle(JoinHandle<()>);

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Probes `/health` and publishes the result.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    api: Arc<dyn ChatApi>,
    status: StatusCell,
    events: Arc<dyn EventSink>,
}

impl ConnectivityMonitor {
    pub fn new(api: Arc<dyn ChatApi>, status: StatusCell, events: Arc<dyn EventSink>) -> Self {
        Self {
            api,
            status,
            events,
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status.get()
    }

    pub fn status_cell(&self) -> &StatusCell {
        &self.status
    }

    /// Run one probe and publish the outcome.
    pub async fn check_status(&self) -> ConnectivityStatus {
        let status = match self.api.health().await {
            Ok(()) => ConnectivityStatus::Connected,
            Err(err) => {
                warn!("health check failed (error={err})");
                ConnectivityStatus::Disconnected
            }
        };
        self.set_status(status);
        status
    }

    /// Publish a status, emitting an event only on change.
    pub fn set_status(&self, status: ConnectivityStatus) {
        if self.status.set(status) {
            info!("connectivity changed (status={status})");
            self.events.emit(ChatEvent::StatusChanged(status));
        }
    }

    /// Probe now and then every `interval` until the handle is dropped.
    pub fn spawn(&self, interval: Duration) -> MonitorHandle {
        let monitor = self.clone();
        MonitorHandle(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check_status().await;
            }
        }))
    }

    /// Probe once after `delay`.
    pub fn schedule_recheck(&self, delay: Duration) -> JoinHandle<()> {
        debug!("scheduling connectivity recheck (delay_ms={})", delay.as_millis());
        let monitor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            monitor.check_status().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_cell_reports_changes() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), ConnectivityStatus::Checking);
        assert!(cell.set(ConnectivityStatus::Connected));
        assert!(!cell.set(ConnectivityStatus::Connected));
        assert_eq!(cell.get(), ConnectivityStatus::Connected);
    }
}
