//! Viewer Frame Types
//!
//! Every frame pushed to a dashboard is a JSON object:
//!
//! ```json
//! {"topic": "sensor/temp", "payload": 23.5, "timestamp": 1714552200000}
//! ```
//!
//! Reserved topics are listed in [`topics`]; any other topic is the raw broker
//! topic of a sensor reading, with the decrypted number as payload.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::health::BrokerStatus;
use crate::readings::Reading;

/// Reserved frame topics
pub mod topics {
    pub const WELCOME: &str = "welcome";
    pub const STATUS: &str = "status";
    pub const STATUS_ERROR: &str = "status-error";
    pub const BROKER_DISCONNECT: &str = "mqtt-disconnect";
    pub const ERROR: &str = "error";
}

/// Greeting sent to every viewer as soon as it is registered
pub const WELCOME_MESSAGE: &str = "Welcome to the WebSocket server!";

/// One frame pushed to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerEvent {
    pub topic: String,
    pub payload: Value,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ViewerEvent {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn welcome() -> Self {
        Self::new(topics::WELCOME, json!(WELCOME_MESSAGE))
    }

    /// Broker pool health from the proxy stats feed
    pub fn status(brokers: &[BrokerStatus]) -> Self {
        Self::new(topics::STATUS, json!(brokers))
    }

    pub fn status_error(message: &str) -> Self {
        Self::new(topics::STATUS_ERROR, json!(message))
    }

    /// The upstream broker connection dropped; `reason` is `error`, `close` or `offline`
    pub fn broker_disconnect(reason: &str) -> Self {
        Self::new(topics::BROKER_DISCONNECT, json!(reason))
    }

    pub fn error(message: &str) -> Self {
        Self::new(topics::ERROR, json!(message))
    }

    /// A decrypted reading, republished under its broker topic
    pub fn reading(reading: &Reading) -> Self {
        Self {
            topic: reading.source_topic.clone(),
            payload: json!(reading.value),
            timestamp: reading.timestamp.timestamp_millis(),
        }
    }

    pub fn is_status(&self) -> bool {
        self.topic == topics::STATUS || self.topic == topics::STATUS_ERROR
    }
}
