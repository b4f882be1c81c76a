//! Health poll runner

use std::sync::Arc;
use std::time::Duration;

use super::error::PollError;
use super::feed::StatusFeed;
use super::parse::{parse_status_csv, BrokerStatus, PoolFilter};
use crate::websocket::{ViewerEvent, ViewerHub};

/// Fetches broker pool health and publishes it to viewers
pub struct HealthPoller {
    feed: Arc<dyn StatusFeed>,
    hub: Arc<ViewerHub>,
    filter: PoolFilter,
    timeout: Duration,
}

impl HealthPoller {
    pub fn new(
        feed: Arc<dyn StatusFeed>,
        hub: Arc<ViewerHub>,
        filter: PoolFilter,
        timeout: Duration,
    ) -> Self {
        Self {
            feed,
            hub,
            filter,
            timeout,
        }
    }

    /// Fetch and parse the report, bounded by the poll timeout
    pub async fn fetch_statuses(&self) -> Result<Vec<BrokerStatus>, PollError> {
        let text = tokio::time::timeout(self.timeout, self.feed.fetch())
            .await
            .map_err(|_| PollError::Timeout(self.timeout.as_millis() as u64))??;

        parse_status_csv(&text, &self.filter)
    }

    /// Run one poll and broadcast the outcome.
    ///
    /// Never fails: errors become a `status-error` frame. Returns the frame
    /// that was broadcast.
    pub async fn poll_once(&self) -> ViewerEvent {
        let event = match self.fetch_statuses().await {
            Ok(brokers) => {
                tracing::info!(brokers = ?brokers, "Broker pool status");
                ViewerEvent::status(&brokers)
            }
            Err(e) => {
                tracing::error!(error = %e, "Stats fetch failed");
                ViewerEvent::status_error(&e.to_string())
            }
        };

        self.hub.broadcast(&event).await;
        event
    }

    /// Run a poll in the background without waiting for it
    pub fn trigger(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            poller.poll_once().await;
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Feed returning a canned response
    pub(crate) struct FakeFeed {
        pub response: Result<String, PollError>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl FakeFeed {
        pub(crate) fn ok(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(err: PollError) -> Self {
            Self {
                response: Err(err),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StatusFeed for FakeFeed {
        async fn fetch(&self) -> Result<String, PollError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }

    pub(crate) const REPORT: &str = "# pxname,svname,status\n\
        mqtt_tls_out,broker1,UP\n\
        mqtt_tls_out,BACKEND,UP\n\
        other,x,DOWN\n";

    fn poller(feed: FakeFeed, hub: Arc<ViewerHub>) -> HealthPoller {
        HealthPoller::new(
            Arc::new(feed),
            hub,
            PoolFilter::default(),
            Duration::from_millis(4000),
        )
    }

    #[tokio::test]
    async fn test_poll_broadcasts_status() {
        let hub = Arc::new(ViewerHub::default());
        let (tx, mut rx) = hub.channel();
        hub.register(tx).await.unwrap();

        let event = poller(FakeFeed::ok(REPORT), Arc::clone(&hub)).poll_once().await;
        assert_eq!(event.topic, "status");
        assert_eq!(event.payload, json!([{"name": "broker1", "status": "UP"}]));

        assert_eq!(rx.try_recv().unwrap().topic, "welcome");
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn test_poll_failure_broadcasts_status_error() {
        let hub = Arc::new(ViewerHub::default());
        let (tx, mut rx) = hub.channel();
        hub.register(tx).await.unwrap();

        let feed = FakeFeed::failing(PollError::Status(503));
        let event = poller(feed, Arc::clone(&hub)).poll_once().await;
        assert_eq!(event.topic, "status-error");
        assert_eq!(event.payload, json!("Stats endpoint returned HTTP 503"));

        rx.try_recv().unwrap();
        assert_eq!(rx.try_recv().unwrap().topic, "status-error");
    }

    #[tokio::test]
    async fn test_report_without_pool_is_empty_status() {
        let hub = Arc::new(ViewerHub::default());
        let event = poller(FakeFeed::ok(""), hub).poll_once().await;
        assert_eq!(event.topic, "status");
        assert_eq!(event.payload, json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_feed_times_out() {
        let hub = Arc::new(ViewerHub::default());
        let feed = FakeFeed {
            delay: Some(Duration::from_secs(10)),
            ..FakeFeed::ok(REPORT)
        };

        let result = poller(feed, hub).fetch_statuses().await;
        assert_eq!(result, Err(PollError::Timeout(4000)));
    }

    #[tokio::test]
    async fn test_trigger_runs_in_background() {
        let hub = Arc::new(ViewerHub::default());
        let (tx, mut rx) = hub.channel();
        hub.register(tx).await.unwrap();

        let poller = Arc::new(poller(FakeFeed::ok(REPORT), Arc::clone(&hub)));
        poller.trigger().await.unwrap();

        rx.try_recv().unwrap();
        assert_eq!(rx.try_recv().unwrap().topic, "status");
    }
}
