//! Self-error throttling

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::types::ErrorRateKey;

/// Minimum time between two reports with the same key
pub const SDK_ERROR_WINDOW_SECS: i64 = 3_600;

#[derive(Debug, Clone, Copy)]
struct RateEntry {
    /// Reports let through
    reported: u32,
    /// Reports swallowed inside the window
    suppressed: u32,
    last_reported: DateTime<Utc>,
}

/// Lets through at most one self-error per key per window
#[derive(Debug)]
pub struct SdkErrorLimiter {
    window: Duration,
    entries: HashMap<ErrorRateKey, RateEntry>,
}

impl Default for SdkErrorLimiter {
    fn default() -> Self {
        Self::new(Duration::seconds(SDK_ERROR_WINDOW_SECS))
    }
}

impl SdkErrorLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Record an attempt at `now`; returns whether it may be sent
    pub fn should_report(&mut self, key: ErrorRateKey, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(
                    key,
                    RateEntry {
                        reported: 1,
                        suppressed: 0,
                        last_reported: now,
                    },
                );
                true
            }
            Some(entry) if now - entry.last_reported >= self.window => {
                entry.reported += 1;
                entry.last_reported = now;
                true
            }
            Some(entry) => {
                entry.suppressed += 1;
                false
            }
        }
    }

    pub fn reported(&self, key: &ErrorRateKey) -> u32 {
        self.entries.get(key).map(|e| e.reported).unwrap_or(0)
    }

    pub fn suppressed(&self, key: &ErrorRateKey) -> u32 {
        self.entries.get(key).map(|e| e.suppressed).unwrap_or(0)
    }
}
