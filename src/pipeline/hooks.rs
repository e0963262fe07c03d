//! Callbacks the host registers with the worker

use serde_json::Value;

/// Callbacks invoked synchronously from the worker thread.
///
/// Keep them short: the worker runs nothing else while a hook executes.
pub trait SessionHooks: Send + Sync + 'static {
    /// The user id was generated by this process rather than restored.
    /// Delivered once, to the first hooks that are registered.
    fn on_new_user(&self, _user_id: &str) {}

    /// A session passed its init handshake
    fn on_session_start(&self, _session_id: &str, _session_num: u64) {}

    /// A session ended after `length_secs` seconds
    fn on_session_end(&self, _session_id: &str, _length_secs: i64) {}
}

/// Told about every init response that replaced the remote configs.
///
/// `configs` is the full JSON object, the same value
/// [`ContextHandle::remote_configs`](crate::ContextHandle::remote_configs) returns.
pub trait RemoteConfigsListener: Send + Sync + 'static {
    fn on_remote_configs_updated(&self, configs: &Value);
}
