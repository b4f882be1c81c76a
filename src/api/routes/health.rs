//! Health Routes
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Broker link state, viewer count and relay counters

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::state::AppState;
use crate::bridge::{ConnectionState, StatsSnapshot};

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` while the broker link is up, `degraded` otherwise
    pub status: String,
    /// Broker link state, or `disabled` when no bridge is running
    pub broker: String,
    pub viewers: usize,
    pub relayed: u64,
    pub dropped: u64,
    pub log_failures: u64,
    pub reconnects: u64,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (broker, stats) = match &state.bridge {
        Some(bridge) => (Some(bridge.state()), bridge.stats()),
        None => (None, StatsSnapshot::default()),
    };

    let status = if broker == Some(ConnectionState::Connected) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        broker: broker.map_or_else(|| "disabled".to_string(), |s| s.to_string()),
        viewers: state.hub.viewer_count().await,
        relayed: stats.relayed,
        dropped: stats.dropped,
        log_failures: stats.log_failures,
        // The first attempt is not a reconnect
        reconnects: stats.connect_attempts.saturating_sub(1),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
