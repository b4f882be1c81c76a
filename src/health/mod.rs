//! Broker Health
//!
//! The MQTT brokers sit behind a load-balancing proxy whose admin endpoint
//! publishes a CSV stats report. The [`HealthPoller`] fetches that report,
//! keeps the rows for the broker pool, and pushes the result to viewers as a
//! `status` frame (or a `status-error` frame when the fetch fails).
//!
//! Polls are event driven: one after every successful broker connection and
//! one for every new viewer. There is no periodic schedule.

mod error;
mod feed;
mod parse;
mod poller;

pub use error::PollError;
pub use feed::{HttpStatusFeed, StatusFeed};
pub use parse::{parse_status_csv, BrokerStatus, PoolFilter};
pub use poller::HealthPoller;

#[cfg(test)]
pub(crate) use poller::tests;
