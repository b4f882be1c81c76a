//! Stats feed transport

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::error::PollError;
use crate::config::StatusFeedConfig;

/// Source of the raw CSV stats report
#[async_trait]
pub trait StatusFeed: Send + Sync {
    /// Fetch the report body
    async fn fetch(&self) -> Result<String, PollError>;
}

/// Fetches the proxy's CSV stats page over HTTP basic auth
pub struct HttpStatusFeed {
    client: Client,
    url: String,
    username: String,
    password: String,
    timeout_ms: u64,
}

impl HttpStatusFeed {
    pub fn new(config: &StatusFeedConfig) -> Result<Self, PollError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PollError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_ms: config.timeout_ms,
        })
    }
}

#[async_trait]
impl StatusFeed for HttpStatusFeed {
    async fn fetch(&self) -> Result<String, PollError> {
        let response = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PollError::Timeout(self.timeout_ms)
                } else {
                    PollError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                PollError::Timeout(self.timeout_ms)
            } else {
                PollError::Request(e.to_string())
            }
        })
    }
}
