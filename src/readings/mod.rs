//! Sensor Readings
//!
//! A [`Reading`] is produced for every payload that decrypts successfully.
//! Readings whose topic maps to a known [`ReadingKind`] are also appended to
//! the per-day [`ReadingLog`].

mod log;
mod types;

pub use log::{ReadingLog, ReadingLogError};
pub use types::{Reading, ReadingKind};
