//! Durable local event queue
//!
//! - `EventStore`: records keyed by sequence number, FIFO delivery order
//! - `Journal`: append-only `events.jsonl` with periodic compaction
//! - `StoreStats`: counters and current sizes
//!
//! # Architecture
//!
//! ```text
//! Write Path (worker thread only):
//! ┌─────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ append  │───►│ journal line │───►│ sync_data()  │───►│ in-memory    │
//! │ ack/... │    │ events.jsonl │    │              │    │ BTreeMap     │
//! └─────────┘    └──────────────┘    └──────────────┘    └──────────────┘
//!
//! Read Path (startup):
//! ┌───────────────┐    ┌──────────────────┐
//! │ Replay journal│───►│ InFlight/Failed  │───► Ready!
//! │ (skip broken) │    │ back to Pending  │
//! └───────────────┘    └──────────────────┘
//! ```

mod journal;
mod stats;
mod store;

pub use journal::{Journal, JournalEntry};
pub use stats::{StoreCounters, StoreStats};
pub use store::{
    AppendOutcome, EventStore, RequeueOutcome, StoreError, StoreResult, JOURNAL_FILE,
};
