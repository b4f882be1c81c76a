//! Bridge HTTP API
//!
//! HTTP and WebSocket surface, built with Axum.
//!
//! # Endpoints
//!
//! ## Viewers
//! - `GET /` - WebSocket stream of viewer frames
//! - `GET /ws` - Same stream, explicit path
//!
//! ## Logs
//! - `GET /api/logs/:type?date=YYYY-MM-DD` - Download a day's reading log
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Broker link state and relay counters

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new().route("/logs/:type", get(routes::logs::download_log));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server is listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("API server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::tests::{FakeFeed, REPORT};
    use crate::health::{HealthPoller, PoolFilter};
    use crate::readings::{ReadingKind, ReadingLog};
    use crate::websocket::ViewerHub;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    fn create_test_app(log_dir: &std::path::Path) -> Router {
        let hub = Arc::new(ViewerHub::default());
        let poller = Arc::new(HealthPoller::new(
            Arc::new(FakeFeed::ok(REPORT)),
            Arc::clone(&hub),
            PoolFilter::default(),
            Duration::from_secs(4),
        ));
        build_router(AppState::new(hub, poller, ReadingLog::new(log_dir)))
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_live() {
        let dir = tempdir().unwrap();
        let response = get(create_test_app(dir.path()), "/health/live").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_without_bridge() {
        let dir = tempdir().unwrap();
        let response = get(create_test_app(dir.path()), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["broker"], "disabled");
        assert_eq!(body["viewers"], 0);
        assert_eq!(body["reconnects"], 0);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_download_log() {
        let dir = tempdir().unwrap();
        let log = ReadingLog::new(dir.path());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        log.try_append_at(ReadingKind::Temp, 23.5, at).await.unwrap();

        let response = get(create_test_app(dir.path()), "/api/logs/temp?date=2024-05-01").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"temp-2024-05-01.log\""
        );

        let body = body_bytes(response).await;
        assert_eq!(body, b"[2024-05-01T08:30:00.000Z] 23.5\n");
    }

    #[tokio::test]
    async fn test_download_missing_log() {
        let dir = tempdir().unwrap();
        let response = get(create_test_app(dir.path()), "/api/logs/wind?date=2020-01-01").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_download_rejects_bad_params() {
        let dir = tempdir().unwrap();

        let response = get(create_test_app(dir.path()), "/api/logs/humidity").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(create_test_app(dir.path()), "/api/logs/temp?date=..%2F..%2Fetc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_plain_get_on_viewer_path_is_not_upgraded() {
        let dir = tempdir().unwrap();
        let response = get(create_test_app(dir.path()), "/ws").await;
        assert!(response.status().is_client_error());
    }
}
