//! Queued records and store limits

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery status of a queued record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Waiting for the next batch
    Pending,
    /// Part of the batch currently being sent
    InFlight,
    /// Last delivery failed; eligible again on the next flush cycle
    Failed(u32),
}

/// An annotated event waiting for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRecord {
    /// Insertion sequence, defines delivery order
    pub seq: u64,
    /// Transport-ready event object
    pub payload: Value,
    /// Number of failed delivery attempts so far
    pub attempts: u32,
    pub status: RecordStatus,
}

impl QueuedRecord {
    pub fn new(seq: u64, payload: Value) -> Self {
        Self {
            seq,
            payload,
            attempts: 0,
            status: RecordStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }
}

/// Capacity and retry limits for the event store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum number of records kept; oldest are evicted past this
    pub max_records: usize,
    /// Maximum number of records per transport call
    pub max_batch_size: usize,
    /// Requeues tolerated per record; the next failure drops it as lost
    pub max_attempts: u32,
    /// Maximum serialized size of one record
    pub max_payload_bytes: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_records: 5_000,
            max_batch_size: 100,
            max_attempts: 5,
            max_payload_bytes: 64 * 1024,
        }
    }
}
