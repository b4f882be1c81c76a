//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The shared AES key has no default: without a valid `AES_SHARED_KEY`
//! (or `crypto.shared_key`) the bridge refuses to start.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crypto::{AssociatedData, SharedKey, DEFAULT_ASSOCIATED_DATA};
use crate::health::PoolFilter;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub crypto: CryptoConfig,

    #[serde(default)]
    pub status_feed: StatusFeedConfig,

    #[serde(default)]
    pub readings: ReadingsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream MQTT broker connection
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// PEM trust bundle for the broker's certificate
    #[serde(default = "default_ca_cert")]
    pub ca_cert: PathBuf,

    /// PEM client certificate presented to the broker
    #[serde(default = "default_client_cert")]
    pub client_cert: PathBuf,

    /// PEM private key for the client certificate
    #[serde(default = "default_client_key")]
    pub client_key: PathBuf,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_broker_host() -> String {
    "haproxy".to_string()
}

fn default_broker_port() -> u16 {
    18884
}

fn default_client_id() -> String {
    "backend-subscriber".to_string()
}

fn default_ca_cert() -> PathBuf {
    PathBuf::from("/app/certs/express/ca_bundle.crt")
}

fn default_client_cert() -> PathBuf {
    PathBuf::from("/app/certs/express/express.crt")
}

fn default_client_key() -> PathBuf {
    PathBuf::from("/app/certs/express/express.key")
}

fn default_keep_alive() -> u64 {
    60
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            ca_cert: default_ca_cert(),
            client_cert: default_client_cert(),
            client_key: default_client_key(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl BrokerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Payload decryption settings
#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    /// Base64 256-bit key; normally supplied via `AES_SHARED_KEY`
    #[serde(default)]
    pub shared_key: Option<String>,

    #[serde(default = "default_associated_data")]
    pub associated_data: String,
}

fn default_associated_data() -> String {
    DEFAULT_ASSOCIATED_DATA.to_string()
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            shared_key: None,
            associated_data: default_associated_data(),
        }
    }
}

impl CryptoConfig {
    /// Decode the shared key; missing or malformed keys are fatal
    pub fn shared_key(&self) -> Result<SharedKey, ConfigError> {
        let encoded = self
            .shared_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingKey)?;
        SharedKey::from_base64(encoded)
    }

    pub fn associated_data(&self) -> AssociatedData {
        AssociatedData::new(self.associated_data.as_bytes())
    }
}

/// Proxy admin stats feed
#[derive(Debug, Clone, Deserialize)]
pub struct StatusFeedConfig {
    #[serde(default = "default_stats_url")]
    pub url: String,

    #[serde(default = "default_stats_user")]
    pub username: String,

    #[serde(default = "default_stats_password")]
    pub password: String,

    /// Proxy name of the broker pool rows
    #[serde(default = "default_proxy_name")]
    pub proxy_name: String,

    /// Aggregate row excluded from the pool
    #[serde(default = "default_aggregate_row")]
    pub aggregate_row: String,

    #[serde(default = "default_stats_timeout")]
    pub timeout_ms: u64,
}

fn default_stats_url() -> String {
    "http://haproxy:8404/stats;csv".to_string()
}

fn default_stats_user() -> String {
    "admin".to_string()
}

fn default_stats_password() -> String {
    "admin".to_string()
}

fn default_proxy_name() -> String {
    "mqtt_tls_out".to_string()
}

fn default_aggregate_row() -> String {
    "BACKEND".to_string()
}

fn default_stats_timeout() -> u64 {
    4000
}

impl Default for StatusFeedConfig {
    fn default() -> Self {
        Self {
            url: default_stats_url(),
            username: default_stats_user(),
            password: default_stats_password(),
            proxy_name: default_proxy_name(),
            aggregate_row: default_aggregate_row(),
            timeout_ms: default_stats_timeout(),
        }
    }
}

impl StatusFeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn pool_filter(&self) -> PoolFilter {
        PoolFilter {
            proxy_name: self.proxy_name.clone(),
            aggregate_row: self.aggregate_row.clone(),
        }
    }
}

/// Reading log location
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingsConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for ReadingsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_viewers")]
    pub max_viewers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_max_viewers() -> usize {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_viewers: default_max_viewers(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("telemetry-bridge").join("config.toml")),
            Some(PathBuf::from("/etc/telemetry-bridge/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check everything that must hold before the bridge starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crypto.shared_key()?;
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Crypto
        if let Some(key) = var("AES_SHARED_KEY") {
            self.crypto.shared_key = Some(key);
        }
        if let Some(aad) = var("AAD") {
            self.crypto.associated_data = aad;
        }

        // Broker
        if let Some(host) = var("BRIDGE_BROKER_HOST") {
            self.broker.host = host;
        }
        if let Some(port) = var("BRIDGE_BROKER_PORT").and_then(|p| p.parse().ok()) {
            self.broker.port = port;
        }
        if let Some(path) = var("BRIDGE_CA_CERT") {
            self.broker.ca_cert = PathBuf::from(path);
        }
        if let Some(path) = var("BRIDGE_CLIENT_CERT") {
            self.broker.client_cert = PathBuf::from(path);
        }
        if let Some(path) = var("BRIDGE_CLIENT_KEY") {
            self.broker.client_key = PathBuf::from(path);
        }

        // Stats feed
        if let Some(url) = var("BRIDGE_STATS_URL") {
            self.status_feed.url = url;
        }
        if let Some(user) = var("BRIDGE_STATS_USER") {
            self.status_feed.username = user;
        }
        if let Some(password) = var("BRIDGE_STATS_PASSWORD") {
            self.status_feed.password = password;
        }

        // Readings
        if let Some(dir) = var("BRIDGE_LOG_DIR") {
            self.readings.log_dir = PathBuf::from(dir);
        }

        // API
        if let Some(host) = var("BRIDGE_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("BRIDGE_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        // Logging
        if let Some(level) = var("BRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("BRIDGE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("AES_SHARED_KEY is not set")]
    MissingKey,

    #[error("Invalid AES_SHARED_KEY: {0}")]
    InvalidKey(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Telemetry Bridge Configuration
#
# Environment variables override these settings:
# - AES_SHARED_KEY, AAD
# - BRIDGE_BROKER_HOST, BRIDGE_BROKER_PORT
# - BRIDGE_CA_CERT, BRIDGE_CLIENT_CERT, BRIDGE_CLIENT_KEY
# - BRIDGE_STATS_URL, BRIDGE_STATS_USER, BRIDGE_STATS_PASSWORD
# - BRIDGE_LOG_DIR
# - BRIDGE_API_HOST, BRIDGE_API_PORT
# - BRIDGE_LOG_LEVEL, BRIDGE_LOG_FORMAT

[broker]
host = "haproxy"
port = 18884
client_id = "backend-subscriber"

# Mutual TLS material (PEM)
ca_cert = "/app/certs/express/ca_bundle.crt"
client_cert = "/app/certs/express/express.crt"
client_key = "/app/certs/express/express.key"

keep_alive_secs = 60

[crypto]
# Base64 256-bit key shared with the sensor nodes. Prefer AES_SHARED_KEY.
# shared_key = ""

# Associated data bound into every envelope
associated_data = "iot-lab-shared"

[status_feed]
url = "http://haproxy:8404/stats;csv"
username = "admin"
password = "admin"

# Proxy whose server rows are the brokers, and its aggregate row
proxy_name = "mqtt_tls_out"
aggregate_row = "BACKEND"

timeout_ms = 4000

[readings]
# Readings are written to <log_dir>/<YYYY-MM-DD>/<kind>.log
log_dir = "logs"

[api]
host = "0.0.0.0"
port = 3001
max_viewers = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
