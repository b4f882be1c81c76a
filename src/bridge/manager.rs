//! Connection manager actor
//!
//! Sole owner of the broker link, the reconnect timer and the link state
//! machine. Transport signals, timer firings and shutdown requests all arrive
//! as [`Command`]s on one queue and are handled strictly in order, so no two
//! transitions ever overlap.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::link::{BrokerConnector, BrokerLink, LinkSignal, LinkSignalSender, SENSOR_TOPIC_FILTERS};
use super::state::{ConnectionState, LinkAction, LinkEvent, LinkMachine};
use super::stats::{BridgeStats, StatsSnapshot};
use crate::crypto::Decryptor;
use crate::health::HealthPoller;
use crate::readings::{Reading, ReadingLog};
use crate::websocket::{ViewerEvent, ViewerHub};

/// Fixed delay before each reconnect attempt; retries are unbounded
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Messages processed by the manager
#[derive(Debug)]
pub(crate) enum Command {
    /// Something happened on link `generation`
    Signal { generation: u64, signal: LinkSignal },
    /// The reconnect timer fired
    ReconnectDue,
    Shutdown,
}

/// Owns the broker connection lifecycle
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    decryptor: Decryptor,
    log: ReadingLog,
    hub: Arc<ViewerHub>,
    poller: Arc<HealthPoller>,

    machine: LinkMachine,
    link: Option<Box<dyn BrokerLink>>,
    /// Incremented for every connection attempt; signals from older links are ignored
    generation: u64,
    reconnect_timer: Option<JoinHandle<()>>,

    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<BridgeStats>,
}

/// Cloneable handle for observing and stopping a running manager
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    stats: Arc<BridgeStats>,
}

impl ManagerHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Ask the manager to tear down the link and stop
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        decryptor: Decryptor,
        log: ReadingLog,
        hub: Arc<ViewerHub>,
        poller: Arc<HealthPoller>,
    ) -> (Self, ManagerHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let stats = Arc::new(BridgeStats::default());

        let handle = ManagerHandle {
            commands: commands_tx.clone(),
            state: state_rx,
            stats: Arc::clone(&stats),
        };

        let manager = Self {
            connector,
            decryptor,
            log,
            hub,
            poller,
            machine: LinkMachine::new(),
            link: None,
            generation: 0,
            reconnect_timer: None,
            commands_tx,
            commands_rx,
            state_tx,
            stats,
        };

        (manager, handle)
    }

    /// Run the manager on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect and process commands until shutdown
    pub async fn run(mut self) {
        self.dispatch(LinkEvent::Start).await;

        while let Some(command) = self.commands_rx.recv().await {
            match command {
                Command::Signal { generation, signal } => {
                    if generation != self.generation {
                        tracing::trace!(generation, current = self.generation, "Ignoring signal from stale link");
                        continue;
                    }
                    self.on_signal(signal).await;
                }
                Command::ReconnectDue => {
                    self.reconnect_timer = None;
                    self.dispatch(LinkEvent::ReconnectDue).await;
                }
                Command::Shutdown => break,
            }
        }

        self.tear_down();
        self.cancel_reconnect();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("Connection manager stopped");
    }

    async fn on_signal(&mut self, signal: LinkSignal) {
        match signal {
            LinkSignal::Connected => {
                tracing::info!("Connected to MQTT broker");
                self.dispatch(LinkEvent::Connected).await;
            }
            LinkSignal::Lost(reason) => {
                tracing::warn!(reason = %reason, "Handling MQTT disconnect");
                self.dispatch(LinkEvent::Lost(reason)).await;
            }
            LinkSignal::Message { topic, payload } => {
                if self.machine.state() == ConnectionState::Connected {
                    self.relay(&topic, &payload).await;
                }
            }
        }
    }

    /// Feed an event to the state machine and carry out the resulting actions.
    ///
    /// Actions can raise follow-up events (a connect that fails outright);
    /// those are queued and handled before returning.
    async fn dispatch(&mut self, event: LinkEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let before = self.machine.state();
            for action in self.machine.handle(event) {
                if let Some(follow_up) = self.perform(action).await {
                    pending.push_back(follow_up);
                }
            }

            let after = self.machine.state();
            if before != after {
                tracing::debug!(from = %before, to = %after, "Broker link state changed");
            }
            self.state_tx.send_replace(after);
        }
    }

    async fn perform(&mut self, action: LinkAction) -> Option<LinkEvent> {
        match action {
            LinkAction::Open => return self.open().await,
            LinkAction::Subscribe => self.subscribe().await,
            LinkAction::CancelReconnect => self.cancel_reconnect(),
            LinkAction::PollHealth => {
                self.poller.trigger();
            }
            LinkAction::TearDown => self.tear_down(),
            LinkAction::AnnounceDisconnect(reason) => {
                self.stats.record_disconnect();
                self.hub
                    .broadcast(&ViewerEvent::broker_disconnect(reason.as_str()))
                    .await;
            }
            LinkAction::ScheduleReconnect => self.schedule_reconnect(),
        }
        None
    }

    async fn open(&mut self) -> Option<LinkEvent> {
        // Never overlap two links
        self.tear_down();

        self.generation += 1;
        self.stats.record_connect_attempt();
        let signals = LinkSignalSender::new(self.generation, self.commands_tx.clone());

        match self.connector.connect(signals).await {
            Ok(link) => {
                self.link = Some(link);
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Connection error");
                Some(LinkEvent::ConnectFailed)
            }
        }
    }

    async fn subscribe(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        for filter in SENSOR_TOPIC_FILTERS {
            if let Err(e) = link.subscribe(filter).await {
                tracing::error!(filter, error = %e, "Subscription error");
            }
        }
    }

    fn tear_down(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.terminate();
        }
    }

    fn schedule_reconnect(&mut self) {
        tracing::info!(delay_ms = RECONNECT_DELAY.as_millis() as u64, "Retrying MQTT connection");
        let commands = self.commands_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_DELAY).await;
            let _ = commands.send(Command::ReconnectDue);
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    /// Decrypt, log and broadcast one broker message
    async fn relay(&mut self, topic: &str, payload: &[u8]) {
        let value = match self.decryptor.open(payload) {
            Ok(value) => value,
            Err(e) => {
                self.stats.record_dropped();
                tracing::warn!(topic = %topic, kind = e.kind(), error = %e, "Failed to decrypt message");
                return;
            }
        };

        let reading = Reading::new(topic, value);
        tracing::debug!(topic = %topic, value, "Received decrypted reading");

        if let Some(kind) = reading.kind() {
            if !self.log.append_at(kind, value, reading.timestamp).await {
                self.stats.record_log_failure();
            }
        }

        self.hub.broadcast(&ViewerEvent::reading(&reading)).await;
        self.stats.record_relayed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::error::LinkError;
    use crate::bridge::state::DisconnectReason;
    use crate::crypto::{AssociatedData, SharedKey};
    use crate::health::tests::{FakeFeed, REPORT};
    use crate::health::PoolFilter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeBroker {
        attempts: AtomicUsize,
        fail: AtomicBool,
        signals: Mutex<Vec<LinkSignalSender>>,
        subscriptions: Arc<Mutex<Vec<String>>>,
        terminated: Arc<AtomicUsize>,
    }

    impl FakeBroker {
        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        /// Signal sender handed to the most recent attempt
        fn latest(&self) -> LinkSignalSender {
            self.signals.lock().unwrap().last().cloned().unwrap()
        }
    }

    struct FakeLink {
        subscriptions: Arc<Mutex<Vec<String>>>,
        terminated: Arc<AtomicUsize>,
        open: bool,
    }

    #[async_trait]
    impl BrokerConnector for FakeBroker {
        async fn connect(&self, signals: LinkSignalSender) -> Result<Box<dyn BrokerLink>, LinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LinkError::Client("refused".to_string()));
            }
            self.signals.lock().unwrap().push(signals);
            Ok(Box::new(FakeLink {
                subscriptions: Arc::clone(&self.subscriptions),
                terminated: Arc::clone(&self.terminated),
                open: true,
            }))
        }
    }

    #[async_trait]
    impl BrokerLink for FakeLink {
        async fn subscribe(&mut self, filter: &str) -> Result<(), LinkError> {
            self.subscriptions.lock().unwrap().push(filter.to_string());
            Ok(())
        }

        fn terminate(&mut self) {
            if self.open {
                self.open = false;
                self.terminated.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct Harness {
        broker: Arc<FakeBroker>,
        feed: Arc<FakeFeed>,
        hub: Arc<ViewerHub>,
        handle: ManagerHandle,
        decryptor: Decryptor,
        viewer: mpsc::Receiver<ViewerEvent>,
        log_dir: TempDir,
    }

    impl Harness {
        async fn start(broker: FakeBroker) -> Self {
            let broker = Arc::new(broker);
            let feed = Arc::new(FakeFeed::ok(REPORT));
            let hub = Arc::new(ViewerHub::default());
            let poller = Arc::new(HealthPoller::new(
                feed.clone(),
                Arc::clone(&hub),
                PoolFilter::default(),
                Duration::from_secs(4),
            ));
            let decryptor = Decryptor::new(SharedKey::from_bytes([3u8; 32]), AssociatedData::default());
            let log_dir = tempfile::tempdir().unwrap();

            let (tx, mut viewer) = hub.channel();
            hub.register(tx).await.unwrap();
            assert_eq!(viewer.recv().await.unwrap().topic, "welcome");

            let (manager, handle) = ConnectionManager::new(
                broker.clone(),
                decryptor.clone(),
                ReadingLog::new(log_dir.path()),
                Arc::clone(&hub),
                poller,
            );
            manager.spawn();

            Self {
                broker,
                feed,
                hub,
                handle,
                decryptor,
                viewer,
                log_dir,
            }
        }

        async fn wait_for_state(&self, expected: ConnectionState) {
            let mut state = self.handle.watch_state();
            tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == expected))
                .await
                .expect("state not reached")
                .unwrap();
        }

        async fn connect(&self) {
            self.wait_for_state(ConnectionState::Connecting).await;
            self.broker.latest().send(LinkSignal::Connected);
            self.wait_for_state(ConnectionState::Connected).await;
        }

        async fn next_frame(&mut self) -> ViewerEvent {
            tokio::time::timeout(Duration::from_secs(5), self.viewer.recv())
                .await
                .expect("no frame")
                .unwrap()
        }

        fn drain(&mut self) -> Vec<ViewerEvent> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.viewer.try_recv() {
                frames.push(frame);
            }
            frames
        }
    }

    /// Let spawned tasks run; with a paused clock this also advances time
    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_subscribes_and_polls() {
        let mut h = Harness::start(FakeBroker::default()).await;
        h.connect().await;

        assert_eq!(
            *h.broker.subscriptions.lock().unwrap(),
            vec!["sensor/+".to_string(), "+/sensor/+".to_string()]
        );

        let frame = h.next_frame().await;
        assert_eq!(frame.topic, "status");
        assert_eq!(h.feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_disconnects_schedule_one_reconnect() {
        let mut h = Harness::start(FakeBroker::default()).await;
        h.connect().await;
        let link = h.broker.latest();

        link.send(LinkSignal::Lost(DisconnectReason::Error));
        link.send(LinkSignal::Lost(DisconnectReason::Close));
        settle(Duration::from_millis(100)).await;
        assert_eq!(h.broker.attempts(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Disconnected);

        settle(Duration::from_millis(1000)).await;
        assert_eq!(h.broker.attempts(), 2);

        // No second timer was left behind
        settle(Duration::from_secs(3)).await;
        assert_eq!(h.broker.attempts(), 2);

        let reasons: Vec<_> = h
            .drain()
            .into_iter()
            .filter(|f| f.topic == "mqtt-disconnect")
            .map(|f| f.payload)
            .collect();
        assert_eq!(reasons, vec![json!("error"), json!("close")]);
        assert_eq!(h.broker.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connects_retry_every_second() {
        let broker = FakeBroker::default();
        broker.fail.store(true, Ordering::SeqCst);
        let mut h = Harness::start(broker).await;

        settle(Duration::from_millis(100)).await;
        assert_eq!(h.broker.attempts(), 1);
        settle(Duration::from_millis(1000)).await;
        assert_eq!(h.broker.attempts(), 2);
        settle(Duration::from_millis(1000)).await;
        assert_eq!(h.broker.attempts(), 3);

        let frame = h.next_frame().await;
        assert_eq!(frame.topic, "mqtt-disconnect");
        assert_eq!(frame.payload, json!("error"));

        // Broker comes back
        h.broker.fail.store(false, Ordering::SeqCst);
        settle(Duration::from_millis(1000)).await;
        h.connect().await;
        assert_eq!(h.broker.attempts(), 4);
        assert_eq!(h.handle.stats().connect_attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_link_signals_ignored() {
        let mut h = Harness::start(FakeBroker::default()).await;
        h.connect().await;
        let old = h.broker.latest();

        old.send(LinkSignal::Lost(DisconnectReason::Offline));
        settle(Duration::from_millis(1100)).await;
        h.connect().await;
        h.drain();

        // A late error from the first link must not disturb the second
        old.send(LinkSignal::Lost(DisconnectReason::Error));
        settle(Duration::from_millis(2000)).await;

        assert_eq!(h.handle.state(), ConnectionState::Connected);
        assert_eq!(h.broker.attempts(), 2);
        assert!(h.drain().iter().all(|f| f.topic != "mqtt-disconnect"));
    }

    #[tokio::test]
    async fn test_message_is_decrypted_logged_and_broadcast() {
        let mut h = Harness::start(FakeBroker::default()).await;
        h.connect().await;

        let envelope = h.decryptor.seal(b"23.5").unwrap();
        let payload = json!({ "data": envelope }).to_string().into_bytes();
        h.broker.latest().send(LinkSignal::Message {
            topic: "device7/sensor/temp".to_string(),
            payload,
        });

        let frame = loop {
            let frame = h.next_frame().await;
            if !frame.is_status() {
                break frame;
            }
        };
        assert_eq!(frame.topic, "device7/sensor/temp");
        assert_eq!(frame.payload, json!(23.5));

        // The log line carries the same instant as the broadcast frame
        let at = chrono::DateTime::from_timestamp_millis(frame.timestamp).unwrap();
        let path = ReadingLog::new(h.log_dir.path())
            .path_for(at.date_naive(), crate::readings::ReadingKind::Temp);
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            format!(
                "[{}] 23.5\n",
                at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            )
        );
        assert_eq!(h.handle.stats().relayed, 1);
    }

    #[tokio::test]
    async fn test_run_future_can_be_spawned() {
        fn assert_send<T: Send>(_: &T) {}

        let hub = Arc::new(ViewerHub::default());
        let poller = Arc::new(HealthPoller::new(
            Arc::new(FakeFeed::ok(REPORT)),
            Arc::clone(&hub),
            PoolFilter::default(),
            Duration::from_secs(4),
        ));
        let (manager, _handle) = ConnectionManager::new(
            Arc::new(FakeBroker::default()),
            Decryptor::new(SharedKey::from_bytes([3u8; 32]), AssociatedData::default()),
            ReadingLog::new("logs"),
            hub,
            poller,
        );

        let run = manager.run();
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_unclassified_topic_broadcast_without_log() {
        let mut h = Harness::start(FakeBroker::default()).await;
        h.connect().await;

        let envelope = h.decryptor.seal(b"4").unwrap();
        h.broker.latest().send(LinkSignal::Message {
            topic: "sensor/unknown".to_string(),
            payload: envelope.into_bytes(),
        });

        let frame = loop {
            let frame = h.next_frame().await;
            if !frame.is_status() {
                break frame;
            }
        };
        assert_eq!(frame.topic, "sensor/unknown");
        assert_eq!(frame.payload, json!(4.0));

        let entries = std::fs::read_dir(h.log_dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_bad_payload_dropped_without_disconnect() {
        let mut h = Harness::start(FakeBroker::default()).await;
        h.connect().await;
        let link = h.broker.latest();

        link.send(LinkSignal::Message {
            topic: "sensor/temp".to_string(),
            payload: b"not-an-envelope".to_vec(),
        });
        let envelope = h.decryptor.seal(b"19").unwrap();
        link.send(LinkSignal::Message {
            topic: "sensor/rain".to_string(),
            payload: envelope.into_bytes(),
        });

        let frame = loop {
            let frame = h.next_frame().await;
            if !frame.is_status() {
                break frame;
            }
        };
        // Only the good reading comes through, in order
        assert_eq!(frame.topic, "sensor/rain");
        assert_eq!(h.handle.state(), ConnectionState::Connected);

        let stats = h.handle.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.relayed, 1);
        assert_eq!(stats.disconnects, 0);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_link() {
        let h = Harness::start(FakeBroker::default()).await;
        h.connect().await;

        h.handle.shutdown();
        h.wait_for_state(ConnectionState::Disconnected).await;
        settle(Duration::from_millis(50)).await;

        assert_eq!(h.broker.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(h.hub.viewer_count().await, 1);
    }
}
