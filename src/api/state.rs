//! Application State
//!
//! Shared state accessible by all API handlers.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::bridge::ManagerHandle;
use crate::health::HealthPoller;
use crate::readings::ReadingLog;
use crate::websocket::{HubError, ViewerEvent, ViewerHub, ViewerId};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live viewer connections
    pub hub: Arc<ViewerHub>,
    /// Broker health poller, run for every new viewer
    pub poller: Arc<HealthPoller>,
    /// Reading log served by the download endpoint
    pub log: ReadingLog,
    /// Broker link state and counters; absent when no bridge is running
    pub bridge: Option<ManagerHandle>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: Arc<ViewerHub>, poller: Arc<HealthPoller>, log: ReadingLog) -> Self {
        Self {
            hub,
            poller,
            log,
            bridge: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_bridge(mut self, bridge: ManagerHandle) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Register a new viewer, then kick off a health poll so it learns the
    /// broker status straight away
    pub async fn accept_viewer(
        &self,
        sender: mpsc::Sender<ViewerEvent>,
    ) -> Result<ViewerId, HubError> {
        let id = self.hub.register(sender).await?;
        self.poller.trigger();
        Ok(id)
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::tests::{FakeFeed, REPORT};
    use crate::health::PoolFilter;
    use crate::websocket::HubConfig;
    use std::time::Duration;

    fn state(hub: Arc<ViewerHub>) -> AppState {
        let poller = Arc::new(HealthPoller::new(
            Arc::new(FakeFeed::ok(REPORT)),
            Arc::clone(&hub),
            PoolFilter::default(),
            Duration::from_secs(4),
        ));
        AppState::new(hub, poller, ReadingLog::new("logs"))
    }

    #[tokio::test]
    async fn test_accept_viewer_sends_welcome_then_status() {
        let state = state(Arc::new(ViewerHub::default()));
        let (tx, mut rx) = state.hub.channel();

        state.accept_viewer(tx).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().topic, "welcome");
        assert_eq!(rx.recv().await.unwrap().topic, "status");
    }

    #[tokio::test]
    async fn test_accept_viewer_over_limit() {
        let hub = Arc::new(ViewerHub::new(HubConfig {
            max_connections: 1,
            ..HubConfig::default()
        }));
        let state = state(hub);

        let (first, _rx1) = state.hub.channel();
        state.accept_viewer(first).await.unwrap();

        let (second, _rx2) = state.hub.channel();
        let err = state.accept_viewer(second).await.unwrap_err();
        assert!(matches!(err, HubError::TooManyConnections(1)));
    }
}
