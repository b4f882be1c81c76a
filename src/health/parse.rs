//! CSV stats report parsing
//!
//! The report starts with a `#`-prefixed header line, e.g.
//!
//! ```text
//! # pxname,svname,qcur,qmax,scur,smax,slim,stot,bin,bout,dreq,dresp,ereq,econ,eresp,wretr,wredis,status,...
//! mqtt_tls_out,broker1,0,0,1,2,,13,...,UP,...
//! mqtt_tls_out,BACKEND,0,0,1,2,,13,...,UP,...
//! ```

use serde::{Deserialize, Serialize};

use super::error::PollError;

const PROXY_COLUMN: &str = "pxname";
const SERVICE_COLUMN: &str = "svname";
const STATUS_COLUMN: &str = "status";

/// Health of one broker behind the proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStatus {
    pub name: String,
    pub status: String,
}

/// Which report rows describe brokers
#[derive(Debug, Clone)]
pub struct PoolFilter {
    /// Proxy name of the broker pool
    pub proxy_name: String,
    /// Synthetic per-proxy aggregate row to skip
    pub aggregate_row: String,
}

impl Default for PoolFilter {
    fn default() -> Self {
        Self {
            proxy_name: "mqtt_tls_out".to_string(),
            aggregate_row: "BACKEND".to_string(),
        }
    }
}

impl PoolFilter {
    fn keeps(&self, proxy: &str, service: &str) -> bool {
        proxy == self.proxy_name && service != self.aggregate_row
    }
}

/// Parse a stats report into the broker pool's rows, in report order.
///
/// A report without the proxy, service or status columns has no pool rows,
/// so it yields an empty list.
pub fn parse_status_csv(text: &str, filter: &PoolFilter) -> Result<Vec<BrokerStatus>, PollError> {
    let cleaned = text
        .lines()
        .map(|line| line.strip_prefix('#').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(cleaned.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(proxy_idx), Some(service_idx), Some(status_idx)) = (
        column(PROXY_COLUMN),
        column(SERVICE_COLUMN),
        column(STATUS_COLUMN),
    ) else {
        tracing::debug!(headers = ?headers, "Stats report has no broker pool columns");
        return Ok(Vec::new());
    };

    let mut brokers = Vec::new();
    for record in reader.records() {
        let record = record?;
        let proxy = record.get(proxy_idx).unwrap_or_default();
        let service = record.get(service_idx).unwrap_or_default();

        if filter.keeps(proxy, service) {
            brokers.push(BrokerStatus {
                name: service.to_string(),
                status: record.get(status_idx).unwrap_or_default().to_string(),
            });
        }
    }

    Ok(brokers)
}
