//! # Telemetry Bridge
//!
//! Relays encrypted sensor telemetry from an MQTT broker to live dashboards.
//!
//! ## Features
//!
//! - **Broker link**: mutually-authenticated TLS subscription with a fixed
//!   1 s reconnect cycle
//! - **Decryption**: AES-256-GCM envelopes with a shared key and AAD
//! - **Reading log**: per-day, per-kind append-only text files
//! - **Real-time**: WebSocket fan-out to every connected viewer
//! - **Broker health**: proxy stats polled on connect and on every new viewer
//!
//! ## Modules
//!
//! - [`bridge`]: Connection lifecycle and message relay
//! - [`crypto`]: Envelope framing and decryption
//! - [`readings`]: Topic classification and the reading log
//! - [`health`]: Broker pool health polling
//! - [`websocket`]: Viewer hub and frames
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML configuration with environment overrides

pub mod api;
pub mod bridge;
pub mod config;
pub mod crypto;
pub mod health;
pub mod readings;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, shutdown_signal, ApiError, AppState};

pub use bridge::{
    BrokerConnector, BrokerLink, ConnectionManager, ConnectionState, DisconnectReason, LinkError,
    ManagerHandle, MqttConnector,
};

pub use config::{Config, ConfigError};

pub use crypto::{AssociatedData, DecryptError, Decryptor, SharedKey};

pub use health::{BrokerStatus, HealthPoller, HttpStatusFeed, PollError, StatusFeed};

pub use readings::{Reading, ReadingKind, ReadingLog};

pub use websocket::{HubConfig, HubError, ViewerEvent, ViewerHub};
