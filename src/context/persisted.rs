//! Session state that survives restarts (`state.json`)

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::atomic_write;

use super::progression::ProgressionTries;

/// File name of the persisted state inside the data directory
pub const STATE_FILE: &str = "state.json";

/// Fields written to `state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_num: u64,
    #[serde(default)]
    pub transaction_num: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_variant_id: Option<String>,
    #[serde(default)]
    pub progression: ProgressionTries,
}

impl PersistedState {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(STATE_FILE)
    }

    /// Load the saved state; a missing or unreadable file yields the default
    pub fn load(data_dir: &Path) -> Self {
        let path = Self::path(data_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read state file");
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring corrupted state file");
            Self::default()
        })
    }

    pub fn save(&self, data_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(Self::path(data_dir), &json)
    }
}
