//! Event Store statistics
//!
//! Lifetime counters kept by the store plus the current size by status.

use std::fmt;

use crate::types::{QueuedRecord, RecordStatus};

/// Counters the store bumps as records move through it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub appended: u64,
    pub acknowledged: u64,
    pub evicted: u64,
    pub lost: u64,
    pub rejected: u64,
}

/// Point-in-time view of the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records accepted since open
    pub appended: u64,
    /// Records delivered and removed
    pub acknowledged: u64,
    /// Records dropped to stay under `max_records`
    pub evicted: u64,
    /// Records dropped after exhausting their attempts
    pub lost: u64,
    /// Records refused by the collector
    pub rejected: u64,
    pub pending: usize,
    pub in_flight: usize,
    pub failed: usize,
}

impl StoreStats {
    pub(crate) fn collect<'a, I>(counters: &StoreCounters, records: I) -> Self
    where
        I: IntoIterator<Item = &'a QueuedRecord>,
    {
        let mut stats = Self {
            appended: counters.appended,
            acknowledged: counters.acknowledged,
            evicted: counters.evicted,
            lost: counters.lost,
            rejected: counters.rejected,
            ..Default::default()
        };

        for record in records {
            match record.status {
                RecordStatus::Pending => stats.pending += 1,
                RecordStatus::InFlight => stats.in_flight += 1,
                RecordStatus::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }

    /// Records currently held
    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.failed
    }

    /// Records that left the store without being delivered
    pub fn dropped(&self) -> u64 {
        self.evicted + self.lost + self.rejected
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Event Store Statistics ===")?;
        writeln!(
            f,
            "Held: {} (pending {}, in flight {}, failed {})",
            self.total(),
            self.pending,
            self.in_flight,
            self.failed
        )?;
        writeln!(f, "Appended: {}", self.appended)?;
        writeln!(f, "Acknowledged: {}", self.acknowledged)?;
        write!(
            f,
            "Dropped: {} (evicted {}, lost {}, rejected {})",
            self.dropped(),
            self.evicted,
            self.lost,
            self.rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_counts_by_status() {
        let mut in_flight = QueuedRecord::new(2, json!({}));
        in_flight.status = RecordStatus::InFlight;
        let mut failed = QueuedRecord::new(3, json!({}));
        failed.status = RecordStatus::Failed(1);
        let records = vec![QueuedRecord::new(1, json!({})), in_flight, failed];

        let counters = StoreCounters {
            appended: 5,
            acknowledged: 1,
            evicted: 1,
            lost: 0,
            rejected: 0,
        };
        let stats = StoreStats::collect(&counters, &records);

        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.dropped(), 1);
        assert!(stats.to_string().contains("Appended: 5"));
    }
}
