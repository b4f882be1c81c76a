//! MQTT over mutual TLS, via rumqttc
//!
//! The event loop is pumped by a dedicated task that stops at the first
//! error. rumqttc would otherwise reconnect on its own; reconnection is the
//! connection manager's job.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS, StateError,
    TlsConfiguration, Transport,
};
use std::io::ErrorKind;
use std::path::Path;
use tokio::task::JoinHandle;

use super::error::LinkError;
use super::link::{BrokerConnector, BrokerLink, LinkSignal, LinkSignalSender};
use super::state::DisconnectReason;
use crate::config::BrokerConfig;

/// Request queue length between the client handle and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Opens MQTT connections to the configured broker
pub struct MqttConnector {
    config: BrokerConfig,
}

impl MqttConnector {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    async fn options(&self) -> Result<MqttOptions, LinkError> {
        let ca = read_pem(&self.config.ca_cert).await?;
        let cert = read_pem(&self.config.client_cert).await?;
        let key = read_pem(&self.config.client_key).await?;

        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options
            .set_keep_alive(self.config.keep_alive())
            .set_clean_session(true)
            .set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: Some((cert, key)),
            }));
        Ok(options)
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self, signals: LinkSignalSender) -> Result<Box<dyn BrokerLink>, LinkError> {
        let options = self.options().await?;

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            generation = signals.generation(),
            "Connecting to MQTT broker"
        );

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let pump = tokio::spawn(pump_events(eventloop, signals));

        Ok(Box::new(MqttLink {
            client,
            pump: Some(pump),
        }))
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, LinkError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| LinkError::Credentials {
            path: path.to_path_buf(),
            source,
        })
}

/// Forward event loop activity to the manager until the first failure
async fn pump_events(mut eventloop: EventLoop, signals: LinkSignalSender) {
    loop {
        let delivered = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => signals.send(LinkSignal::Connected),
            Ok(Event::Incoming(Packet::Publish(publish))) => signals.send(LinkSignal::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::Disconnect)) => {
                signals.send(LinkSignal::Lost(DisconnectReason::Close));
                break;
            }
            Ok(_) => true,
            Err(e) => {
                let reason = classify_error(&e);
                tracing::warn!(error = %e, reason = %reason, "MQTT event loop stopped");
                signals.send(LinkSignal::Lost(reason));
                break;
            }
        };

        if !delivered {
            break;
        }
    }
}

/// Map a transport failure onto the disconnect reason reported to viewers
pub(crate) fn classify_error(err: &ConnectionError) -> DisconnectReason {
    match err {
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => DisconnectReason::Offline,
        ConnectionError::MqttState(StateError::AwaitPingResp) => DisconnectReason::Offline,
        ConnectionError::Io(e) if is_closed(e.kind()) => DisconnectReason::Close,
        ConnectionError::MqttState(StateError::Io(e)) if is_closed(e.kind()) => {
            DisconnectReason::Close
        }
        _ => DisconnectReason::Error,
    }
}

fn is_closed(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// A live rumqttc connection
struct MqttLink {
    client: AsyncClient,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn subscribe(&mut self, filter: &str) -> Result<(), LinkError> {
        if self.pump.is_none() {
            return Err(LinkError::Closed);
        }
        self.client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| LinkError::Client(e.to_string()))
    }

    fn terminate(&mut self) {
        // Dropping the event loop closes the socket
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.terminate();
    }
}
