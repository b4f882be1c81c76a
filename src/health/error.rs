//! Health poll error types

use thiserror::Error;

/// Why a stats poll produced no broker list.
///
/// Always reported to viewers as a `status-error` frame, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Stats request failed: {0}")]
    Request(String),

    #[error("Stats request timed out after {0} ms")]
    Timeout(u64),

    #[error("Stats endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Stats CSV could not be parsed: {0}")]
    Csv(String),
}

impl From<csv::Error> for PollError {
    fn from(err: csv::Error) -> Self {
        PollError::Csv(err.to_string())
    }
}
