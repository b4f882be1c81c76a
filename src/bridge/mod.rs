//! Broker Bridge
//!
//! Maintains the subscription to the MQTT broker and relays every sensor
//! message: decrypt, log by kind, broadcast to viewers.
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Disconnected --Start/ReconnectDue--> Connecting --Connected--> Connected
//!        ^                                   |                        |
//!        +------------ Lost / ConnectFailed -+------------------------+
//! ```
//!
//! Every loss tears the old connection down, tells viewers with an
//! `mqtt-disconnect` frame and arms a single 1 s reconnect timer. Retries
//! continue forever at that fixed delay.
//!
//! The [`LinkMachine`] decides transitions; the [`ConnectionManager`] owns the
//! live link and timer and performs the actions it asks for.

mod error;
mod link;
mod manager;
mod mqtt;
mod state;
mod stats;

pub use error::LinkError;
pub use link::{BrokerConnector, BrokerLink, LinkSignal, LinkSignalSender, SENSOR_TOPIC_FILTERS};
pub use manager::{ConnectionManager, ManagerHandle, RECONNECT_DELAY};
pub use mqtt::MqttConnector;
pub use state::{ConnectionState, DisconnectReason, LinkAction, LinkEvent, LinkMachine};
pub use stats::{BridgeStats, StatsSnapshot};
