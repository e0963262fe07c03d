//! Pipeline configuration
//!
//! Environment:
//! - GAME_TELEMETRY_DATA_DIR: data directory (relative paths resolve against the current dir,
//!   default `./game_telemetry_data`)
//! - GAME_TELEMETRY_ENDPOINT: collector base URL
//! - GAME_TELEMETRY_GZIP: `0`/`false` disables gzip for event batches

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, PipelineResult};
use crate::types::StoreLimits;
use crate::validation::ProgressionOrderPolicy;

/// Value of the `sdk_version` annotation
pub const SDK_VERSION: &str = concat!("rust ", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_ENDPOINT: &str = "https://api.gameanalytics.com";

/// Data directory used by `from_env` when no override is set
pub const DEFAULT_DATA_DIR: &str = "game_telemetry_data";

static BUILD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\s\-_\.\(\)\!\?]{1,32}$").unwrap());

/// Device description attached to every event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub platform: String,
    pub os_version: String,
    pub device: String,
    pub manufacturer: String,
    pub engine_version: Option<String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: env::consts::OS.to_string(),
            os_version: format!("{} unknown", env::consts::OS),
            device: "unknown".to_string(),
            manufacturer: "unknown".to_string(),
            engine_version: None,
        }
    }
}

/// Everything the pipeline needs at start
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub game_key: String,
    pub game_secret: String,
    pub endpoint: String,
    /// `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub use_gzip: bool,
    pub limits: StoreLimits,
    /// Period of the flush timer
    pub flush_interval: Duration,
    /// Pending records that trigger a flush without waiting for the timer
    pub flush_threshold: usize,
    /// Capacity of the task queue; the oldest task is shed past this
    pub queue_capacity: usize,
    /// How long `shutdown` waits for the worker
    pub drain_timeout: Duration,
    pub http_timeout: Duration,
    pub flush_on_shutdown: bool,
    pub manual_session_handling: bool,
    pub event_submission_enabled: bool,
    pub error_reporting_enabled: bool,
    pub progression_order_policy: ProgressionOrderPolicy,
    pub build: String,
    /// Overrides the generated user id
    pub user_id: Option<String>,
    /// Host identity annotated next to the user id
    pub external_user_id: Option<String>,
    pub device: DeviceInfo,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            game_key: String::new(),
            game_secret: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            data_dir: None,
            use_gzip: true,
            limits: StoreLimits::default(),
            flush_interval: Duration::from_secs(8),
            flush_threshold: 100,
            queue_capacity: 10_000,
            drain_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(30),
            flush_on_shutdown: true,
            manual_session_handling: false,
            event_submission_enabled: true,
            error_reporting_enabled: true,
            progression_order_policy: ProgressionOrderPolicy::default(),
            build: String::new(),
            user_id: None,
            external_user_id: None,
            device: DeviceInfo::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(game_key: impl Into<String>, game_secret: impl Into<String>) -> Self {
        Self {
            game_key: game_key.into(),
            game_secret: game_secret.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `GAME_TELEMETRY_*` variables.
    ///
    /// Unlike `new`, this always persists: without `GAME_TELEMETRY_DATA_DIR`
    /// the journal lives in `DEFAULT_DATA_DIR` under the current directory.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let dir = env::var("GAME_TELEMETRY_DATA_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        config.data_dir = Some(resolve_dir(dir.trim()));

        if let Ok(endpoint) = env::var("GAME_TELEMETRY_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.endpoint = endpoint.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(gzip) = env::var("GAME_TELEMETRY_GZIP") {
            let gzip = gzip.trim().to_ascii_lowercase();
            config.use_gzip = !matches!(gzip.as_str(), "0" | "false" | "no" | "off");
        }

        config
    }

    pub fn with_keys(mut self, game_key: impl Into<String>, game_secret: impl Into<String>) -> Self {
        self.game_key = game_key.into();
        self.game_secret = game_secret.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.data_dir = Some(data_dir.as_ref().to_path_buf());
        self
    }

    /// Keep the queue and identity in memory only
    pub fn without_persistence(mut self) -> Self {
        self.data_dir = None;
        self
    }

    pub fn with_gzip(mut self, use_gzip: bool) -> Self {
        self.use_gzip = use_gzip;
        self
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }

    pub fn with_manual_session_handling(mut self, manual: bool) -> Self {
        self.manual_session_handling = manual;
        self
    }

    pub fn with_progression_order_policy(mut self, policy: ProgressionOrderPolicy) -> Self {
        self.progression_order_policy = policy;
        self
    }

    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = build.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_external_user_id(mut self, id: impl Into<String>) -> Self {
        self.external_user_id = Some(id.into());
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Check keys and limits before anything is started
    pub fn validate(&self) -> PipelineResult<()> {
        if !is_valid_key(&self.game_key) {
            return Err(PipelineError::invalid(
                "game_key",
                "must be 1-64 alphanumeric characters",
            ));
        }
        if !is_valid_key(&self.game_secret) {
            return Err(PipelineError::invalid(
                "game_secret",
                "must be 1-64 alphanumeric characters",
            ));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(PipelineError::invalid(
                "endpoint",
                format!("'{}' is not an http(s) URL", self.endpoint),
            ));
        }
        if !self.build.is_empty() && !BUILD_PATTERN.is_match(&self.build) {
            return Err(PipelineError::invalid("build", "must be 1-32 event-part characters"));
        }
        if self.user_id.as_deref().is_some_and(|id| id.is_empty() || id.len() > 64) {
            return Err(PipelineError::invalid("user_id", "must be 1-64 characters"));
        }
        if self.external_user_id.as_deref().is_some_and(|id| !is_valid_external_user_id(id)) {
            return Err(PipelineError::invalid("external_user_id", "must be 1-64 characters"));
        }

        let limits = &self.limits;
        if limits.max_records == 0 {
            return Err(PipelineError::invalid("limits.max_records", "must be at least 1"));
        }
        if limits.max_batch_size == 0 {
            return Err(PipelineError::invalid("limits.max_batch_size", "must be at least 1"));
        }
        if limits.max_attempts == 0 {
            return Err(PipelineError::invalid("limits.max_attempts", "must be at least 1"));
        }
        if limits.max_payload_bytes < 256 {
            return Err(PipelineError::invalid(
                "limits.max_payload_bytes",
                "must be at least 256 bytes",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::invalid("queue_capacity", "must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(PipelineError::invalid("flush_interval", "must be non-zero"));
        }

        Ok(())
    }
}

pub(crate) fn is_valid_external_user_id(id: &str) -> bool {
    !id.is_empty() && id.chars().count() <= 64
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= 64 && key.chars().all(|c| c.is_ascii_alphanumeric())
}

fn resolve_dir(dir: &str) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PipelineConfig {
        PipelineConfig::new("gamekey123", "secret456")
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
        assert!(valid().with_build("1.0.2 (beta)").validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_keys() {
        let err = PipelineConfig::new("", "secret").validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { field: "game_key", .. }));

        let err = PipelineConfig::new("key", "not-alnum!").validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { field: "game_secret", .. }));
    }

    #[test]
    fn test_rejects_bad_limits() {
        let mut config = valid();
        config.limits.max_batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidConfig { field: "limits.max_batch_size", .. }
        ));
    }

    #[test]
    fn test_rejects_bad_endpoint_and_build() {
        let err = valid().with_endpoint("ftp://x").validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { field: "endpoint", .. }));

        let err = valid().with_build("a/b").validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { field: "build", .. }));
    }

    #[test]
    fn test_external_user_id_bounds() {
        assert!(valid().with_external_user_id("steam:7656").validate().is_ok());

        let err = valid().with_external_user_id("").validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { field: "external_user_id", .. }));
        let err = valid().with_external_user_id("x".repeat(65)).validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { field: "external_user_id", .. }));
    }

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let config = valid().with_endpoint("http://localhost:8080/");
        assert_eq!(config.endpoint, "http://localhost:8080");
    }

    #[test]
    fn test_relative_data_dir_resolves_against_current_dir() {
        let resolved = resolve_dir("telemetry");
        assert!(resolved.is_absolute() || resolved.starts_with("."));
        assert!(resolved.ends_with("telemetry"));
    }

    #[test]
    fn test_from_env_persists_by_default() {
        env::remove_var("GAME_TELEMETRY_DATA_DIR");
        let config = PipelineConfig::from_env();
        let dir = config.data_dir.expect("durable by default");
        assert!(dir.ends_with(DEFAULT_DATA_DIR));

        assert!(PipelineConfig::from_env().without_persistence().data_dir.is_none());
        assert!(PipelineConfig::new("k", "s").data_dir.is_none());
    }
}
