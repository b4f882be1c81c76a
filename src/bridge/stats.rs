//! Relay counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the connection manager
#[derive(Debug, Default)]
pub struct BridgeStats {
    relayed: AtomicU64,
    dropped: AtomicU64,
    log_failures: AtomicU64,
    connect_attempts: AtomicU64,
    disconnects: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Readings decrypted and broadcast
    pub relayed: u64,
    /// Messages that failed decryption
    pub dropped: u64,
    pub log_failures: u64,
    pub connect_attempts: u64,
    pub disconnects: u64,
}

impl BridgeStats {
    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_failure(&self) {
        self.log_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            relayed: self.relayed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = BridgeStats::default();
        stats.record_relayed();
        stats.record_relayed();
        stats.record_dropped();
        stats.record_connect_attempt();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.relayed, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.connect_attempts, 1);
        assert_eq!(snapshot.log_failures, 0);
    }
}
