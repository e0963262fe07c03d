//! Progression attempt counters

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Attempts per progression path plus the paths currently started
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionTries {
    #[serde(default)]
    tries: BTreeMap<String, u32>,
    /// Not persisted; a restart forgets which paths were started
    #[serde(skip)]
    started: BTreeSet<String>,
}

impl ProgressionTries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> u32 {
        self.tries.get(path).copied().unwrap_or(0)
    }

    pub fn set(&mut self, path: impl Into<String>, tries: u32) {
        self.tries.insert(path.into(), tries);
    }

    /// Bump the counter for `path` and return the new value
    pub fn increment(&mut self, path: &str) -> u32 {
        let tries = self.tries.entry(path.to_string()).or_insert(0);
        *tries += 1;
        *tries
    }

    pub fn remove(&mut self, path: &str) {
        self.tries.remove(path);
    }

    pub fn mark_started(&mut self, path: impl Into<String>) {
        self.started.insert(path.into());
    }

    pub fn mark_finished(&mut self, path: &str) {
        self.started.remove(path);
    }

    pub fn is_started(&self, path: &str) -> bool {
        self.started.contains(path)
    }

    pub fn len(&self) -> usize {
        self.tries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tries.is_empty()
    }
}
