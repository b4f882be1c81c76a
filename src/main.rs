//! Telemetry Bridge Server
//!
//! Run with: cargo run --bin telemetry-bridge
//!
//! # Configuration
//!
//! Read from the first `config.toml` found in the user config dir,
//! `/etc/telemetry-bridge/` or the working directory, then overridden by
//! environment variables:
//! - `AES_SHARED_KEY`: base64 256-bit key (required)
//! - `AAD`: associated data (default: iot-lab-shared)
//! - `BRIDGE_BROKER_HOST` / `BRIDGE_BROKER_PORT`: broker address
//! - `BRIDGE_CA_CERT`, `BRIDGE_CLIENT_CERT`, `BRIDGE_CLIENT_KEY`: TLS material
//! - `BRIDGE_STATS_URL`, `BRIDGE_STATS_USER`, `BRIDGE_STATS_PASSWORD`: proxy stats
//! - `BRIDGE_API_HOST` / `BRIDGE_API_PORT`: HTTP/WebSocket bind (default: 0.0.0.0:3001)
//! - `BRIDGE_LOG_DIR`: reading log directory (default: logs)
//! - `BRIDGE_LOG_LEVEL` / `BRIDGE_LOG_FORMAT`: tracing level and `pretty`/`json`
//! - `RUST_LOG`: log filter (overrides `logging.level`)

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telemetry_bridge::api::{serve, shutdown_signal, AppState};
use telemetry_bridge::bridge::{ConnectionManager, MqttConnector};
use telemetry_bridge::config::{Config, LoggingConfig};
use telemetry_bridge::crypto::Decryptor;
use telemetry_bridge::health::{HealthPoller, HttpStatusFeed};
use telemetry_bridge::readings::ReadingLog;
use telemetry_bridge::websocket::{HubConfig, ViewerHub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config load warnings go through a temporary subscriber; the configured
    // one can only be built once the config is known.
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), Config::load_default);
    init_tracing(&config.logging);

    tracing::info!("Starting telemetry bridge v{}", env!("CARGO_PKG_VERSION"));

    // Without a usable key nothing can be decrypted
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    let key = config.crypto.shared_key()?;
    let decryptor = Decryptor::new(key, config.crypto.associated_data());

    let hub = Arc::new(ViewerHub::new(HubConfig {
        max_connections: config.api.max_viewers,
        ..HubConfig::default()
    }));

    let feed = Arc::new(HttpStatusFeed::new(&config.status_feed)?);
    let poller = Arc::new(HealthPoller::new(
        feed,
        Arc::clone(&hub),
        config.status_feed.pool_filter(),
        config.status_feed.timeout(),
    ));

    let log = ReadingLog::new(&config.readings.log_dir);
    tracing::info!("Reading log directory: {:?}", log.root());

    let connector = Arc::new(MqttConnector::new(config.broker.clone()));
    tracing::info!(
        "Broker: {}:{} as {}",
        config.broker.host,
        config.broker.port,
        config.broker.client_id
    );

    let (manager, bridge) = ConnectionManager::new(
        connector,
        decryptor,
        log.clone(),
        Arc::clone(&hub),
        Arc::clone(&poller),
    );
    let manager_task = manager.spawn();

    let state = AppState::new(hub, poller, log).with_bridge(bridge.clone());
    let served = serve(state, &config.api, shutdown_signal()).await;

    tracing::info!("Stopping broker bridge...");
    bridge.shutdown();
    if let Err(e) = manager_task.await {
        tracing::error!(error = %e, "Connection manager task failed");
    }

    served?;
    tracing::info!("Telemetry bridge stopped");
    Ok(())
}

/// Plain stderr subscriber used while the config itself is loading
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_bridge=info".into()),
        )
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("telemetry_bridge={},tower_http={}", logging.level, logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
