//! Log Routes
//!
//! - GET /api/logs/:type?date=YYYY-MM-DD - Download one day's reading log

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::readings::ReadingKind;

#[derive(Debug, Deserialize)]
pub struct LogParams {
    /// Day to fetch; today (UTC) when omitted
    pub date: Option<String>,
}

/// GET /api/logs/:type
///
/// Both parameters are parsed into typed values before any path is built,
/// so nothing from the request reaches the filesystem verbatim.
pub async fn download_log(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<LogParams>,
) -> ApiResult<Response> {
    let kind: ReadingKind = kind.parse().map_err(ApiError::Validation)?;
    let date = match params.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => Utc::now().date_naive(),
    };

    let path = state.log.path_for(date, kind);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("No {} log for {}", kind, date)));
        }
        Err(e) => return Err(e.into()),
    };

    let filename = format!("{}-{}.log", kind, date.format("%Y-%m-%d"));
    tracing::debug!(file = %filename, bytes = body.len(), "Serving reading log");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(body),
    )
        .into_response())
}

fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ApiError::Validation(format!("Invalid date '{}': {}", raw, e)))
}
