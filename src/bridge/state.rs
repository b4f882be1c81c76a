//! Broker link state machine
//!
//! Pure transition logic: `(state, event) -> (state, actions)`. The
//! [`ConnectionManager`](super::ConnectionManager) feeds it events and
//! carries out the returned actions; nothing here touches I/O.

use serde::Serialize;
use std::fmt;

/// Lifecycle of the single broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Why the broker connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Transport or protocol error, including failed connects
    Error,
    /// The connection was closed
    Close,
    /// The broker stopped responding
    Offline,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Error => "error",
            DisconnectReason::Close => "close",
            DisconnectReason::Offline => "offline",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Process start
    Start,
    /// The pending reconnect timer fired
    ReconnectDue,
    /// Handshake completed
    Connected,
    /// The connection attempt could not even be started
    ConnectFailed,
    /// An established or in-progress connection dropped
    Lost(DisconnectReason),
}

/// Side effects requested by a transition, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Begin a new broker connection
    Open,
    /// Subscribe to the sensor topic filters
    Subscribe,
    /// Cancel the pending reconnect timer
    CancelReconnect,
    /// Run one broker health poll
    PollHealth,
    /// Forcibly terminate the current connection handle
    TearDown,
    /// Tell viewers the broker link dropped
    AnnounceDisconnect(DisconnectReason),
    /// Arm the reconnect timer
    ScheduleReconnect,
}

/// Connection state plus the single pending-reconnect slot
#[derive(Debug, Clone)]
pub struct LinkMachine {
    state: ConnectionState,
    reconnect_pending: bool,
}

impl LinkMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_pending: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Apply one event and return the actions to perform
    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkAction> {
        match event {
            LinkEvent::Start | LinkEvent::ReconnectDue => {
                if matches!(event, LinkEvent::ReconnectDue) {
                    self.reconnect_pending = false;
                }
                if self.state != ConnectionState::Disconnected {
                    return Vec::new();
                }
                self.state = ConnectionState::Connecting;
                vec![LinkAction::Open]
            }

            LinkEvent::Connected => {
                if self.state != ConnectionState::Connecting {
                    return Vec::new();
                }
                self.state = ConnectionState::Connected;

                let mut actions = vec![LinkAction::Subscribe];
                if self.reconnect_pending {
                    self.reconnect_pending = false;
                    actions.push(LinkAction::CancelReconnect);
                }
                actions.push(LinkAction::PollHealth);
                actions
            }

            LinkEvent::ConnectFailed => self.lost(DisconnectReason::Error),

            LinkEvent::Lost(reason) => self.lost(reason),
        }
    }

    fn lost(&mut self, reason: DisconnectReason) -> Vec<LinkAction> {
        self.state = ConnectionState::Disconnected;

        let mut actions = vec![LinkAction::TearDown];
        if !self.reconnect_pending {
            self.reconnect_pending = true;
            actions.push(LinkAction::ScheduleReconnect);
        }
        actions.push(LinkAction::AnnounceDisconnect(reason));
        actions
    }
}

impl Default for LinkMachine {
    fn default() -> Self {
        Self::new()
    }
}
