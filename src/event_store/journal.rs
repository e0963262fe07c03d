//! Append-only journal backing the event store
//!
//! Every store mutation that must survive a restart is written as one JSON
//! line and synced before the call returns:
//!
//! ```text
//! {"op":"append","seq":1,"payload":{...}}
//! {"op":"attempt","seq":1,"attempts":1}
//! {"op":"remove","seq":1}
//! ```
//!
//! Replaying the lines in order rebuilds the live record set. Once enough
//! lines pile up, [`Journal::compact`] rewrites the file with only the live
//! records (temp file + rename).

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::QueuedRecord;
use crate::utils::atomic_write_with;

use super::store::StoreResult;

fn is_zero(val: &u32) -> bool {
    *val == 0
}

/// One line of the journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    Append {
        seq: u64,
        payload: Value,
        #[serde(default, skip_serializing_if = "is_zero")]
        attempts: u32,
    },
    Attempt {
        seq: u64,
        attempts: u32,
    },
    Remove {
        seq: u64,
    },
}

impl JournalEntry {
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Handle on the journal file
pub struct Journal {
    path: PathBuf,
    file: File,
    lines: usize,
}

impl Journal {
    /// Open (or create) the journal and return the entries already in it.
    ///
    /// Lines that fail to parse are skipped with a warning; the rest of the
    /// journal still loads.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (line_num, line_result) in reader.lines().enumerate() {
                let line = line_result?;
                if line.trim().is_empty() {
                    continue;
                }
                match JournalEntry::from_json_line(&line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(
                        line = line_num + 1,
                        error = %e,
                        "skipping malformed journal line"
                    ),
                }
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if !ends_with_newline(&path)? {
            // Torn tail from a crash mid-write
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        let lines = entries.len();
        Ok((Self { path, file, lines }, entries))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written since the last compaction (including replayed ones)
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Append entries and sync them to disk
    pub fn write(&mut self, entries: &[JournalEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&entry.to_json_line()?);
            buf.push('\n');
        }

        self.file.write_all(buf.as_bytes())?;
        self.file.sync_data()?;
        self.lines += entries.len();
        Ok(())
    }

    /// Rewrite the journal so it only holds `live` records
    pub fn compact<'a, I>(&mut self, live: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'a QueuedRecord>,
    {
        let mut count = 0;
        let mut lines = Vec::new();
        for record in live {
            let entry = JournalEntry::Append {
                seq: record.seq,
                payload: record.payload.clone(),
                attempts: record.attempts,
            };
            lines.push(entry.to_json_line()?);
            count += 1;
        }

        atomic_write_with(&self.path, |out| {
            for line in &lines {
                writeln!(out, "{}", line)?;
            }
            Ok(())
        })?;

        // The old handle points at the replaced inode
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        debug!(before = self.lines, after = count, "compacted journal");
        self.lines = count;
        Ok(())
    }
}
