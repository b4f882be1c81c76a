//! Seams between the connection manager and a broker transport

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::LinkError;
use super::manager::Command;
use super::state::DisconnectReason;

/// Topic filters covering `sensor/<kind>` and `<device>/sensor/<kind>`
pub const SENSOR_TOPIC_FILTERS: [&str; 2] = ["sensor/+", "+/sensor/+"];

/// What a live transport reports back to the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    /// The broker accepted the connection
    Connected,
    /// An application message arrived
    Message { topic: String, payload: Vec<u8> },
    /// The transport failed or was closed
    Lost(DisconnectReason),
}

/// Channel a transport uses to report signals, tagged with its link generation
#[derive(Debug, Clone)]
pub struct LinkSignalSender {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl LinkSignalSender {
    pub(crate) fn new(generation: u64, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            generation,
            commands,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a signal; returns false once the manager has stopped
    pub fn send(&self, signal: LinkSignal) -> bool {
        self.commands
            .send(Command::Signal {
                generation: self.generation,
                signal,
            })
            .is_ok()
    }
}

/// Opens broker connections
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Start connecting. The handshake outcome and everything after it is
    /// reported through `signals`; an `Err` means the attempt could not start.
    async fn connect(&self, signals: LinkSignalSender) -> Result<Box<dyn BrokerLink>, LinkError>;
}

/// Handle to one broker connection
#[async_trait]
pub trait BrokerLink: Send {
    /// Subscribe to a topic filter
    async fn subscribe(&mut self, filter: &str) -> Result<(), LinkError>;

    /// Forcibly close the connection. Calling it again is a no-op.
    fn terminate(&mut self);
}
