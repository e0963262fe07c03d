//! Event Store - durable FIFO queue of annotated events
//!
//! Records live in memory keyed by sequence number; every change that must
//! survive a restart goes through the [`Journal`] first. Only the worker
//! thread touches the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{QueuedRecord, RecordStatus, StoreLimits};
use crate::utils::cleanup_temp_files;

use super::journal::{Journal, JournalEntry};
use super::stats::{StoreCounters, StoreStats};

/// File name of the journal inside the data directory
pub const JOURNAL_FILE: &str = "events.jsonl";

/// Smallest number of journal lines before compaction is considered
const MIN_COMPACTION_LINES: usize = 1_000;

/// Result type for EventStore operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in EventStore operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record of {size} bytes exceeds the {limit} byte limit")]
    RecordTooLarge { size: usize, limit: usize },
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub seq: u64,
    /// Records evicted to make room, oldest first
    pub evicted: Vec<u64>,
}

/// Result of requeueing a failed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequeueOutcome {
    pub requeued: Vec<u64>,
    /// Records that hit the attempt bound and were dropped
    pub lost: Vec<u64>,
}

/// The EventStore keeps pending records and their journal in step
pub struct EventStore {
    limits: StoreLimits,
    records: BTreeMap<u64, QueuedRecord>,
    next_seq: u64,
    /// `None` when running memory-only
    journal: Option<Journal>,
    counters: StoreCounters,
    /// Records in `Pending` status, kept in step with every transition
    pending: usize,
}

impl EventStore {
    /// Open the store in `data_dir`, replaying any existing journal
    pub fn open<P: AsRef<Path>>(data_dir: P, limits: StoreLimits) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let cleaned = cleanup_temp_files(data_dir)?;
        if cleaned > 0 {
            warn!(count = cleaned, "removed leftover temp files");
        }

        let (journal, entries) = Journal::open(Self::journal_path(data_dir))?;
        let mut store = Self {
            limits,
            records: BTreeMap::new(),
            next_seq: 1,
            journal: Some(journal),
            counters: StoreCounters::default(),
            pending: 0,
        };
        store.replay(entries);
        info!(
            records = store.records.len(),
            next_seq = store.next_seq,
            "event store opened"
        );

        // Restore the cap if limits shrank since the last run
        while store.records.len() > store.limits.max_records {
            let Some(seq) = store.eviction_candidate() else {
                break;
            };
            store.remove_records(&[seq])?;
            store.counters.evicted += 1;
        }

        Ok(store)
    }

    /// A store that keeps records in memory only
    pub fn in_memory(limits: StoreLimits) -> Self {
        Self {
            limits,
            records: BTreeMap::new(),
            next_seq: 1,
            journal: None,
            counters: StoreCounters::default(),
            pending: 0,
        }
    }

    /// Path of the journal for a given data directory
    pub fn journal_path(data_dir: &Path) -> PathBuf {
        data_dir.join(JOURNAL_FILE)
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    fn replay(&mut self, entries: Vec<JournalEntry>) {
        for entry in entries {
            match entry {
                JournalEntry::Append {
                    seq,
                    payload,
                    attempts,
                } => {
                    let mut record = QueuedRecord::new(seq, payload);
                    record.attempts = attempts;
                    self.records.insert(seq, record);
                    self.next_seq = self.next_seq.max(seq + 1);
                }
                JournalEntry::Attempt { seq, attempts } => {
                    if let Some(record) = self.records.get_mut(&seq) {
                        record.attempts = attempts;
                    }
                }
                JournalEntry::Remove { seq } => {
                    self.records.remove(&seq);
                    self.next_seq = self.next_seq.max(seq + 1);
                }
            }
        }
        // Nothing is in flight after a restart
        for record in self.records.values_mut() {
            record.status = RecordStatus::Pending;
        }
        self.pending = self.records.len();
    }

    /// Drop a record from memory, keeping the pending count in step
    fn forget(&mut self, seq: u64) {
        if let Some(record) = self.records.remove(&seq) {
            if record.is_pending() {
                self.pending -= 1;
            }
        }
    }

    fn write(&mut self, entries: &[JournalEntry]) -> StoreResult<()> {
        match self.journal.as_mut() {
            Some(journal) => journal.write(entries),
            None => Ok(()),
        }
    }

    /// Oldest pending record, or the oldest record of any status
    fn eviction_candidate(&self) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.is_pending())
            .or_else(|| self.records.values().next())
            .map(|r| r.seq)
    }

    /// Append an annotated event; returns its sequence number.
    ///
    /// The record is on disk when this returns `Ok`. At capacity the
    /// oldest pending record is evicted in the same journal write.
    pub fn append(&mut self, payload: Value) -> StoreResult<AppendOutcome> {
        let size = serde_json::to_vec(&payload)?.len();
        if size > self.limits.max_payload_bytes {
            return Err(StoreError::RecordTooLarge {
                size,
                limit: self.limits.max_payload_bytes,
            });
        }

        let mut evicted = Vec::new();
        let overflow = (self.records.len() + 1).saturating_sub(self.limits.max_records);
        for record in self.records.values().filter(|r| r.is_pending()) {
            if evicted.len() == overflow {
                break;
            }
            evicted.push(record.seq);
        }
        for record in self.records.values() {
            if evicted.len() == overflow {
                break;
            }
            if !evicted.contains(&record.seq) {
                evicted.push(record.seq);
            }
        }
        evicted.sort_unstable();

        let seq = self.next_seq;
        let mut entries: Vec<JournalEntry> = evicted
            .iter()
            .map(|&seq| JournalEntry::Remove { seq })
            .collect();
        entries.push(JournalEntry::Append {
            seq,
            payload: payload.clone(),
            attempts: 0,
        });
        self.write(&entries)?;

        for &seq in &evicted {
            self.forget(seq);
        }
        if !evicted.is_empty() {
            self.counters.evicted += evicted.len() as u64;
            debug!(evicted = ?evicted, "store at capacity, evicted oldest records");
        }

        self.records.insert(seq, QueuedRecord::new(seq, payload));
        self.pending += 1;
        self.next_seq += 1;
        self.counters.appended += 1;

        Ok(AppendOutcome { seq, evicted })
    }

    /// Move up to `max` oldest pending records to in-flight
    pub fn take_batch(&mut self, max: usize) -> Vec<QueuedRecord> {
        let mut batch = Vec::new();
        for record in self.records.values_mut() {
            if batch.len() >= max || batch.len() == self.pending {
                break;
            }
            if record.is_pending() {
                record.status = RecordStatus::InFlight;
                batch.push(record.clone());
            }
        }
        self.pending -= batch.len();
        batch
    }

    /// Remove delivered records; unknown sequence numbers are ignored
    pub fn acknowledge(&mut self, seqs: &[u64]) -> StoreResult<usize> {
        let removed = self.remove_records(seqs)?;
        self.counters.acknowledged += removed as u64;
        Ok(removed)
    }

    /// Drop records the collector refused; they are never resent
    pub fn discard(&mut self, seqs: &[u64]) -> StoreResult<usize> {
        let removed = self.remove_records(seqs)?;
        self.counters.rejected += removed as u64;
        Ok(removed)
    }

    /// Mark in-flight records failed, dropping those past the attempt bound
    pub fn requeue(&mut self, seqs: &[u64]) -> StoreResult<RequeueOutcome> {
        let mut outcome = RequeueOutcome::default();
        let mut entries = Vec::new();

        for &seq in seqs {
            let Some(record) = self.records.get(&seq) else {
                continue;
            };
            if record.status != RecordStatus::InFlight {
                continue;
            }
            let attempts = record.attempts + 1;
            if attempts > self.limits.max_attempts {
                entries.push(JournalEntry::Remove { seq });
                outcome.lost.push(seq);
            } else {
                entries.push(JournalEntry::Attempt { seq, attempts });
                outcome.requeued.push(seq);
            }
        }
        self.write(&entries)?;

        for &seq in &outcome.lost {
            self.forget(seq);
        }
        for seq in &outcome.requeued {
            if let Some(record) = self.records.get_mut(seq) {
                record.attempts += 1;
                record.status = RecordStatus::Failed(record.attempts);
            }
        }

        if !outcome.lost.is_empty() {
            self.counters.lost += outcome.lost.len() as u64;
            warn!(
                count = outcome.lost.len(),
                max_attempts = self.limits.max_attempts,
                "dropping records that exhausted their delivery attempts"
            );
        }
        self.maybe_compact()?;
        Ok(outcome)
    }

    /// Make failed records eligible again; returns how many were reset
    pub fn reset_failed(&mut self) -> usize {
        let mut reset = 0;
        for record in self.records.values_mut() {
            if matches!(record.status, RecordStatus::Failed(_)) {
                record.status = RecordStatus::Pending;
                reset += 1;
            }
        }
        self.pending += reset;
        reset
    }

    /// Put every in-flight record back to pending without counting an attempt
    pub fn release_in_flight(&mut self) -> usize {
        let mut released = 0;
        for record in self.records.values_mut() {
            if record.status == RecordStatus::InFlight {
                record.status = RecordStatus::Pending;
                released += 1;
            }
        }
        self.pending += released;
        released
    }

    fn remove_records(&mut self, seqs: &[u64]) -> StoreResult<usize> {
        let known: Vec<u64> = seqs
            .iter()
            .copied()
            .filter(|seq| self.records.contains_key(seq))
            .collect();
        if known.is_empty() {
            return Ok(0);
        }

        let entries: Vec<JournalEntry> =
            known.iter().map(|&seq| JournalEntry::Remove { seq }).collect();
        self.write(&entries)?;
        for &seq in &known {
            self.forget(seq);
        }

        self.maybe_compact()?;
        Ok(known.len())
    }

    fn maybe_compact(&mut self) -> StoreResult<()> {
        let threshold = MIN_COMPACTION_LINES.max(self.limits.max_records * 2);
        let Some(journal) = self.journal.as_mut() else {
            return Ok(());
        };
        if journal.lines() < threshold {
            return Ok(());
        }
        journal.compact(self.records.values())
    }

    /// Rewrite the journal with only the live records
    pub fn compact(&mut self) -> StoreResult<()> {
        match self.journal.as_mut() {
            Some(journal) => journal.compact(self.records.values()),
            None => Ok(()),
        }
    }

    pub fn get(&self, seq: u64) -> Option<&QueuedRecord> {
        self.records.get(&seq)
    }

    /// Records in delivery order
    pub fn records(&self) -> impl Iterator<Item = &QueuedRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats::collect(&self.counters, self.records.values())
    }
}
