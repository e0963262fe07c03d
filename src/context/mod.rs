//! Session and remote configuration context
//!
//! [`SessionContext`] is the single source of truth for identifiers, custom
//! dimensions, remote configuration and session state. It is shared through
//! a [`ContextHandle`]: any thread may read copies of it, only the worker
//! writes.

mod annotations;
mod persisted;
mod progression;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use uuid::Uuid;

use crate::transport::InitResponse;
use crate::types::{CustomFields, DimensionSlot};
use crate::utils::server_time_offset;
use crate::validation::EventRules;

pub use annotations::{event_annotations, init_annotations, sdk_error_annotations};
pub use persisted::{PersistedState, STATE_FILE};
pub use progression::ProgressionTries;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session yet, or the last start attempt failed
    #[default]
    Idle,
    /// Waiting for the init handshake
    InitPending,
    Active,
    Ended,
}

/// Per-process session state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub user_id: String,
    /// Host-side identity sent next to `user_id`; not persisted
    pub external_user_id: Option<String>,
    pub session_id: Option<String>,
    pub session_num: u64,
    pub transaction_num: u64,
    /// Adjusted timestamp of the current session start
    pub session_start: Option<i64>,
    /// Frozen length of the last ended session, in seconds
    pub session_length: i64,
    pub state: SessionState,
    pub build: String,
    pub custom_dimensions: [Option<String>; 3],
    pub global_fields: CustomFields,
    pub ab_id: Option<String>,
    pub ab_variant_id: Option<String>,
    pub configs_hash: Option<String>,
    pub remote_configs: BTreeMap<String, Value>,
    pub remote_configs_ready: bool,
    /// Set once the collector has accepted an init request
    pub init_authorized: bool,
    pub event_submission_enabled: bool,
    pub error_reporting_enabled: bool,
    pub manual_session_handling: bool,
    pub server_time_offset: i64,
    pub progression: ProgressionTries,
}

impl SessionContext {
    /// Fresh context from persisted state; a new user id is generated if none was saved
    pub fn restore(persisted: PersistedState) -> Self {
        let user_id = if persisted.user_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            persisted.user_id
        };

        Self {
            user_id,
            session_num: persisted.session_num,
            transaction_num: persisted.transaction_num,
            configs_hash: persisted.configs_hash,
            ab_id: persisted.ab_id,
            ab_variant_id: persisted.ab_variant_id,
            progression: persisted.progression,
            event_submission_enabled: true,
            error_reporting_enabled: true,
            ..Default::default()
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            user_id: self.user_id.clone(),
            session_num: self.session_num,
            transaction_num: self.transaction_num,
            configs_hash: self.configs_hash.clone(),
            ab_id: self.ab_id.clone(),
            ab_variant_id: self.ab_variant_id.clone(),
            progression: self.progression.clone(),
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Assign a new session id and number; the session is not active until init succeeds
    pub fn begin_session(&mut self) {
        self.session_id = Some(Uuid::new_v4().to_string());
        self.session_num += 1;
        self.session_start = None;
        self.session_length = 0;
        self.state = SessionState::InitPending;
    }

    /// Mark the pending session active at `now`
    pub fn activate_session(&mut self, now: i64) {
        self.session_start = Some(now);
        self.state = SessionState::Active;
    }

    /// Failed init: back to idle, the assigned number is given back
    pub fn abort_session(&mut self) {
        self.session_id = None;
        self.session_num = self.session_num.saturating_sub(1);
        self.state = SessionState::Idle;
    }

    /// Freeze the session length and mark the session ended
    pub fn end_session(&mut self, now: i64) -> i64 {
        self.session_length = self.current_session_length(now);
        self.session_start = None;
        self.state = SessionState::Ended;
        self.session_length
    }

    /// Seconds since the session started, or the frozen length once ended
    pub fn current_session_length(&self, now: i64) -> i64 {
        match self.session_start {
            Some(start) => (now - start).max(0),
            None => self.session_length,
        }
    }

    pub fn next_transaction_num(&mut self) -> u64 {
        self.transaction_num += 1;
        self.transaction_num
    }

    pub fn custom_dimension(&self, slot: DimensionSlot) -> Option<&str> {
        self.custom_dimensions[slot.index()].as_deref()
    }

    pub fn set_custom_dimension(&mut self, slot: DimensionSlot, value: Option<String>) {
        self.custom_dimensions[slot.index()] = value.filter(|v| !v.is_empty());
    }

    /// Apply an accepted init response.
    ///
    /// Configuration entries outside their `start_ts`/`end_ts` window are
    /// skipped. Payload and hash are replaced together.
    pub fn apply_init_response(&mut self, response: &InitResponse, local_ts: i64) {
        if let Some(server_ts) = response.server_ts {
            self.server_time_offset = server_time_offset(server_ts, local_ts);
        }
        let now = local_ts + self.server_time_offset;

        let mut configs = BTreeMap::new();
        for entry in &response.configurations {
            if entry.start_ts.is_some_and(|start| start > now) {
                continue;
            }
            if entry.end_ts.is_some_and(|end| end < now) {
                continue;
            }
            configs.insert(entry.key.clone(), entry.value.clone());
        }

        self.remote_configs = configs;
        self.configs_hash = response.configs_hash.clone();
        if response.ab_id.is_some() {
            self.ab_id = response.ab_id.clone();
            self.ab_variant_id = response.ab_variant_id.clone();
        }
        self.remote_configs_ready = true;
        self.init_authorized = true;
    }
}

/// Shared handle on the session context and the event rules
#[derive(Debug, Clone)]
pub struct ContextHandle {
    context: Arc<RwLock<SessionContext>>,
    rules: Arc<RwLock<EventRules>>,
}

impl ContextHandle {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context: Arc::new(RwLock::new(context)),
            rules: Arc::new(RwLock::new(EventRules::default())),
        }
    }

    /// Copy of the whole context
    pub fn snapshot(&self) -> SessionContext {
        self.context.read().clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.context.read().state
    }

    pub fn is_session_active(&self) -> bool {
        self.context.read().is_session_active()
    }

    pub fn session_id(&self) -> Option<String> {
        self.context.read().session_id.clone()
    }

    pub fn session_num(&self) -> u64 {
        self.context.read().session_num
    }

    pub fn user_id(&self) -> String {
        self.context.read().user_id.clone()
    }

    pub fn external_user_id(&self) -> Option<String> {
        self.context.read().external_user_id.clone()
    }

    pub fn custom_dimension(&self, slot: DimensionSlot) -> Option<String> {
        self.context.read().custom_dimension(slot).map(str::to_string)
    }

    pub fn ab_id(&self) -> Option<String> {
        self.context.read().ab_id.clone()
    }

    pub fn ab_variant_id(&self) -> Option<String> {
        self.context.read().ab_variant_id.clone()
    }

    pub fn configs_hash(&self) -> Option<String> {
        self.context.read().configs_hash.clone()
    }

    pub fn is_remote_configs_ready(&self) -> bool {
        self.context.read().remote_configs_ready
    }

    pub fn remote_config_value(&self, key: &str) -> Option<Value> {
        self.context.read().remote_configs.get(key).cloned()
    }

    /// Remote config value as a string; non-string values are rendered as JSON
    pub fn remote_config_string(&self, key: &str, default: &str) -> String {
        match self.remote_config_value(key) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    /// All remote configs as one JSON object
    pub fn remote_configs(&self) -> Value {
        let ctx = self.context.read();
        Value::Object(
            ctx.remote_configs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn progression_tries(&self, path: &str) -> u32 {
        self.context.read().progression.get(path)
    }

    pub fn rules(&self) -> EventRules {
        self.rules.read().clone()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SessionContext> {
        self.context.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SessionContext> {
        self.context.write()
    }

    pub(crate) fn read_rules(&self) -> RwLockReadGuard<'_, EventRules> {
        self.rules.read()
    }

    pub(crate) fn write_rules(&self) -> RwLockWriteGuard<'_, EventRules> {
        self.rules.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RemoteConfigEntry;
    use serde_json::json;

    fn init_response(configurations: Vec<RemoteConfigEntry>) -> InitResponse {
        InitResponse {
            configs_hash: Some("hash-2".to_string()),
            ab_id: Some("ab".to_string()),
            ab_variant_id: Some("variant-b".to_string()),
            configurations,
            server_ts: None,
        }
    }

    fn entry(key: &str, start_ts: Option<i64>, end_ts: Option<i64>) -> RemoteConfigEntry {
        RemoteConfigEntry {
            key: key.to_string(),
            value: json!(key),
            start_ts,
            end_ts,
        }
    }

    #[test]
    fn test_restore_generates_user_id_once() {
        let ctx = SessionContext::restore(PersistedState::default());
        assert!(!ctx.user_id.is_empty());

        let again = SessionContext::restore(ctx.to_persisted());
        assert_eq!(again.user_id, ctx.user_id);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut ctx = SessionContext::restore(PersistedState::default());

        ctx.begin_session();
        assert_eq!(ctx.state, SessionState::InitPending);
        assert_eq!(ctx.session_num, 1);
        let first_id = ctx.session_id.clone();

        ctx.activate_session(1_000);
        assert!(ctx.is_session_active());
        assert_eq!(ctx.current_session_length(1_030), 30);

        assert_eq!(ctx.end_session(1_045), 45);
        assert_eq!(ctx.state, SessionState::Ended);
        assert_eq!(ctx.current_session_length(2_000), 45);

        ctx.begin_session();
        assert_ne!(ctx.session_id, first_id);
        assert_eq!(ctx.session_num, 2);
    }

    #[test]
    fn test_abort_returns_to_idle() {
        let mut ctx = SessionContext::restore(PersistedState::default());
        ctx.begin_session();
        ctx.abort_session();

        assert_eq!(ctx.state, SessionState::Idle);
        assert_eq!(ctx.session_num, 0);
        assert!(ctx.session_id.is_none());
    }

    #[test]
    fn test_init_response_filters_configs_by_window() {
        let mut ctx = SessionContext::restore(PersistedState::default());
        let response = init_response(vec![
            entry("live", Some(900), Some(1_100)),
            entry("future", Some(2_000), None),
            entry("expired", None, Some(500)),
            entry("open", None, None),
        ]);

        ctx.apply_init_response(&response, 1_000);

        let keys: Vec<&str> = ctx.remote_configs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["live", "open"]);
        assert_eq!(ctx.configs_hash.as_deref(), Some("hash-2"));
        assert_eq!(ctx.ab_variant_id.as_deref(), Some("variant-b"));
        assert!(ctx.remote_configs_ready);
        assert!(ctx.init_authorized);
    }

    #[test]
    fn test_init_response_without_hash_clears_it() {
        let mut ctx = SessionContext::restore(PersistedState::default());
        ctx.apply_init_response(&init_response(vec![]), 1_000);
        assert_eq!(ctx.configs_hash.as_deref(), Some("hash-2"));

        let mut response = init_response(vec![entry("open", None, None)]);
        response.configs_hash = None;
        ctx.apply_init_response(&response, 1_000);

        assert_eq!(ctx.configs_hash, None);
        assert!(ctx.remote_configs.contains_key("open"));
    }

    #[test]
    fn test_init_response_learns_server_offset() {
        let mut ctx = SessionContext::restore(PersistedState::default());
        let mut response = init_response(vec![entry("later", Some(1_500), None)]);
        response.server_ts = Some(2_000);

        ctx.apply_init_response(&response, 1_000);

        assert_eq!(ctx.server_time_offset, 1_000);
        assert!(ctx.remote_configs.contains_key("later"));
    }

    #[test]
    fn test_handle_reads_are_copies() {
        let handle = ContextHandle::new(SessionContext::restore(PersistedState::default()));
        handle.write().remote_configs.insert("speed".into(), json!(3));

        assert_eq!(handle.remote_config_value("speed"), Some(json!(3)));
        assert_eq!(handle.remote_config_string("speed", "1"), "3");
        assert_eq!(handle.remote_config_string("missing", "1"), "1");
        assert_eq!(handle.remote_configs(), json!({"speed": 3}));

        let mut snapshot = handle.snapshot();
        snapshot.remote_configs.clear();
        assert!(handle.remote_config_value("speed").is_some());
    }

    #[test]
    fn test_empty_dimension_clears_slot() {
        let mut ctx = SessionContext::default();
        ctx.set_custom_dimension(DimensionSlot::Second, Some("ninja".into()));
        assert_eq!(ctx.custom_dimension(DimensionSlot::Second), Some("ninja"));

        ctx.set_custom_dimension(DimensionSlot::Second, Some(String::new()));
        assert_eq!(ctx.custom_dimension(DimensionSlot::Second), None);
    }
}
