//! Public entry point
//!
//! [`Pipeline`] validates on the calling thread and hands everything else
//! to the worker as a [`Task`]. No method waits for the worker except
//! [`Pipeline::wait_until_idle`] and [`Pipeline::shutdown`].

mod hooks;
mod panic_report;

use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{is_valid_external_user_id, PipelineConfig};
use crate::context::{ContextHandle, PersistedState, SessionContext};
use crate::error::{PipelineError, PipelineResult};
use crate::event_store::EventStore;
use crate::scheduler::{PushOutcome, Setting, Task, TaskQueue, Worker, WorkerHandle, WorkerSettings};
use crate::transport::{Collector, HttpCollector};
use crate::types::{
    CustomFields, DimensionSlot, ErrorSeverity, FlowType, GameEvent, ProgressionStatus, SdkError,
    SdkErrorAction, SdkErrorArea, SdkErrorCategory,
};
use crate::validation::{
    clean_custom_fields, is_valid_short_string, validate_custom_dimension, validate_event,
};

pub use hooks::{RemoteConfigsListener, SessionHooks};
pub use panic_report::MAX_PANIC_REPORTS;

/// Thread-safe telemetry client
pub struct Pipeline {
    worker: WorkerHandle,
    context: ContextHandle,
    drain_timeout: Duration,
}

impl Pipeline {
    /// Start with settings from the environment and the given keys
    pub fn initialize(game_key: &str, game_secret: &str) -> PipelineResult<Self> {
        Self::start(PipelineConfig::from_env().with_keys(game_key, game_secret))
    }

    /// Start against the HTTP collector named in `config`
    pub fn start(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let collector = HttpCollector::new(&config)?;
        Self::with_collector(config, Arc::new(collector))
    }

    /// Start against any [`Collector`]
    pub fn with_collector(
        config: PipelineConfig,
        collector: Arc<dyn Collector>,
    ) -> PipelineResult<Self> {
        config.validate()?;

        let mut startup_errors = Vec::new();
        let mut data_dir = config.data_dir.clone();
        let store = match &config.data_dir {
            Some(dir) => match EventStore::open(dir, config.limits) {
                Ok(store) => store,
                Err(e) => {
                    warn!(
                        dir = %dir.display(),
                        error = %e,
                        "could not open event store, keeping events in memory"
                    );
                    startup_errors.push(SdkError::new(
                        SdkErrorCategory::Database,
                        SdkErrorArea::AddEventsToStore,
                        SdkErrorAction::DatabaseOpenOrCreate,
                        None,
                        e.to_string(),
                    ));
                    data_dir = None;
                    EventStore::in_memory(config.limits)
                }
            },
            None => EventStore::in_memory(config.limits),
        };

        let persisted = data_dir
            .as_deref()
            .map(PersistedState::load)
            .unwrap_or_default();
        let new_user = persisted.user_id.is_empty() && config.user_id.is_none();

        let mut session = SessionContext::restore(persisted);
        if let Some(user_id) = &config.user_id {
            session.user_id = user_id.clone();
        }
        session.build = config.build.clone();
        session.external_user_id = config.external_user_id.clone();
        session.event_submission_enabled = config.event_submission_enabled;
        session.error_reporting_enabled = config.error_reporting_enabled;
        session.manual_session_handling = config.manual_session_handling;
        let user_id = session.user_id.clone();
        let context = ContextHandle::new(session);

        let queue = Arc::new(TaskQueue::new(config.queue_capacity));
        let mut settings = WorkerSettings::from_config(&config);
        settings.data_dir = data_dir;

        let mut worker = Worker::new(queue, context.clone(), store, collector, settings)
            .with_new_user(new_user);
        for error in startup_errors {
            worker.report_on_start(error);
        }
        let worker = worker
            .spawn()
            .map_err(|e| PipelineError::Worker(e.to_string()))?;

        if !config.manual_session_handling {
            worker.push(Task::StartSession);
        }
        info!(
            user_id = %user_id,
            endpoint = %config.endpoint,
            manual_sessions = config.manual_session_handling,
            "telemetry pipeline started"
        );

        Ok(Self {
            worker,
            context,
            drain_timeout: config.drain_timeout,
        })
    }

    fn submit(&self, task: Task) -> bool {
        match self.worker.push(task) {
            PushOutcome::Queued | PushOutcome::ShedOldest => true,
            PushOutcome::Closed => {
                warn!("pipeline is shut down, ignoring call");
                false
            }
        }
    }

    /// Read-only view of the session context
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    // ---- events ----

    /// Validate and queue an event; returns whether it was accepted
    pub fn add_event(&self, event: GameEvent) -> bool {
        self.add_event_with_fields(event, CustomFields::new())
    }

    /// Like [`add_event`](Self::add_event) with per-event custom fields
    pub fn add_event_with_fields(&self, event: GameEvent, fields: CustomFields) -> bool {
        let verdict = validate_event(&event, &self.context.read_rules());
        if let Err(rejection) = verdict {
            warn!(%rejection, "event rejected");
            self.submit(Task::ReportSdkError(rejection));
            return false;
        }

        let cleaned = clean_custom_fields(&fields);
        if !cleaned.dropped.is_empty() {
            warn!(dropped = ?cleaned.dropped, "invalid custom fields dropped");
        }
        self.submit(Task::AddEvent {
            event,
            fields: cleaned.fields,
        })
    }

    pub fn add_business_event(
        &self,
        currency: &str,
        amount: i64,
        item_type: &str,
        item_id: &str,
        cart_type: Option<&str>,
    ) -> bool {
        self.add_event(GameEvent::Business {
            currency: currency.to_string(),
            amount,
            item_type: item_type.to_string(),
            item_id: item_id.to_string(),
            cart_type: cart_type.map(str::to_string),
        })
    }

    pub fn add_resource_event(
        &self,
        flow_type: FlowType,
        currency: &str,
        amount: f64,
        item_type: &str,
        item_id: &str,
    ) -> bool {
        self.add_event(GameEvent::Resource {
            flow_type,
            currency: currency.to_string(),
            amount,
            item_type: item_type.to_string(),
            item_id: item_id.to_string(),
        })
    }

    pub fn add_progression_event(
        &self,
        status: ProgressionStatus,
        progression01: &str,
        progression02: Option<&str>,
        progression03: Option<&str>,
        score: Option<f64>,
    ) -> bool {
        self.add_event(GameEvent::Progression {
            status,
            progression01: progression01.to_string(),
            progression02: progression02.map(str::to_string),
            progression03: progression03.map(str::to_string),
            score,
        })
    }

    pub fn add_design_event(&self, event_id: &str, value: Option<f64>) -> bool {
        self.add_event(GameEvent::Design {
            event_id: event_id.to_string(),
            value,
        })
    }

    pub fn add_error_event(&self, severity: ErrorSeverity, message: &str) -> bool {
        self.add_event(GameEvent::Error {
            severity,
            message: message.to_string(),
        })
    }

    // ---- sessions ----

    pub fn start_session(&self) -> bool {
        self.submit(Task::StartSession)
    }

    pub fn end_session(&self) -> bool {
        self.submit(Task::EndSession)
    }

    /// Ask the worker to send pending records now
    pub fn flush(&self) -> bool {
        self.submit(Task::Flush)
    }

    // ---- configuration ----

    /// Set or clear (`None`/empty) a custom dimension
    pub fn set_custom_dimension(&self, slot: DimensionSlot, value: Option<&str>) -> bool {
        let verdict = validate_custom_dimension(slot, value, &self.context.read_rules());
        if let Err(rejection) = verdict {
            warn!(%rejection, "custom dimension rejected");
            self.submit(Task::ReportSdkError(rejection));
            return false;
        }
        self.submit(Task::SetCustomDimension {
            slot,
            value: value.map(str::to_string),
        })
    }

    pub fn set_available_custom_dimension_values(&self, slot: DimensionSlot, values: Vec<String>) {
        self.context.write_rules().available_dimensions[slot.index()] = values;
    }

    pub fn set_available_currencies(&self, currencies: Vec<String>) {
        self.context.write_rules().available_currencies = currencies;
    }

    pub fn set_available_item_types(&self, item_types: Vec<String>) {
        self.context.write_rules().available_item_types = item_types;
    }

    pub fn set_build(&self, build: &str) -> bool {
        if !is_valid_short_string(build) {
            warn!(build, "build must be at most 32 characters");
            return false;
        }
        self.submit(Task::SetFlag(Setting::Build(build.to_string())))
    }

    /// Set or clear (empty) the host identity sent with every event
    pub fn set_external_user_id(&self, id: &str) -> bool {
        if !id.is_empty() && !is_valid_external_user_id(id) {
            warn!("external user id must be at most 64 characters");
            return false;
        }
        let id = (!id.is_empty()).then(|| id.to_string());
        self.submit(Task::SetFlag(Setting::ExternalUserId(id)))
    }

    pub fn set_manual_session_handling(&self, manual: bool) -> bool {
        self.submit(Task::SetFlag(Setting::ManualSessionHandling(manual)))
    }

    pub fn set_event_submission_enabled(&self, enabled: bool) -> bool {
        self.submit(Task::SetFlag(Setting::EventSubmission(enabled)))
    }

    pub fn set_error_reporting_enabled(&self, enabled: bool) -> bool {
        self.submit(Task::SetFlag(Setting::ErrorReporting(enabled)))
    }

    /// Fields added to every later event; per-event fields win on collision
    pub fn set_global_custom_fields(&self, fields: CustomFields) -> bool {
        let cleaned = clean_custom_fields(&fields);
        if !cleaned.dropped.is_empty() {
            warn!(dropped = ?cleaned.dropped, "invalid global custom fields dropped");
        }
        self.submit(Task::SetGlobalCustomFields(cleaned.fields))
    }

    pub fn set_session_hooks(&self, hooks: Arc<dyn SessionHooks>) -> bool {
        self.submit(Task::SetHooks(Some(hooks)))
    }

    pub fn clear_session_hooks(&self) -> bool {
        self.submit(Task::SetHooks(None))
    }

    /// Called on the worker each time an init response replaces the remote configs
    pub fn add_remote_configs_listener(&self, listener: Arc<dyn RemoteConfigsListener>) -> bool {
        self.submit(Task::AddRemoteConfigsListener(listener))
    }

    /// Unregister a listener previously added with the same `Arc`
    pub fn remove_remote_configs_listener(
        &self,
        listener: &Arc<dyn RemoteConfigsListener>,
    ) -> bool {
        self.submit(Task::RemoveRemoteConfigsListener(Arc::clone(listener)))
    }

    /// Report panics from any thread as critical error events.
    ///
    /// The hook is process-wide and chains to the one it replaces. It feeds
    /// the pipeline that called this most recently, and stops after
    /// [`MAX_PANIC_REPORTS`] reports.
    pub fn install_panic_reporter(&self) {
        panic_report::install(self.worker.queue());
    }

    // ---- lifecycle ----

    /// Block until every task queued so far has run, or `timeout` passes
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let (tx, rx) = sync_channel(1);
        if !self.submit(Task::Sync(tx)) {
            return false;
        }
        rx.recv_timeout(timeout).is_ok()
    }

    /// Drain the queue, end the automatic session, flush and stop the worker.
    ///
    /// Returns `false` if the worker had to be abandoned after the drain
    /// timeout; unsent records stay on disk for the next start.
    pub fn shutdown(&self) -> bool {
        if !self.worker.is_running() {
            return true;
        }
        let drained = self.worker.shutdown(self.drain_timeout);
        info!(drained, "telemetry pipeline stopped");
        drained
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponseKind, InitOutcome, InitResponse};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingCollector {
        batches: Mutex<Vec<Vec<Value>>>,
    }

    impl Collector for RecordingCollector {
        fn request_init<'a>(&'a self, _body: &'a Value) -> BoxFuture<'a, InitOutcome> {
            async { InitOutcome::new(HttpResponseKind::Ok, Some(InitResponse::default())) }.boxed()
        }

        fn send_events<'a>(&'a self, events: &'a [Value]) -> BoxFuture<'a, HttpResponseKind> {
            self.batches.lock().push(events.to_vec());
            async { HttpResponseKind::Ok }.boxed()
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new("gamekey123", "secret456").with_flush_interval(Duration::from_secs(60))
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let result = Pipeline::with_collector(
            PipelineConfig::new("", "secret"),
            Arc::new(RecordingCollector::default()),
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_rejected_event_is_not_queued() {
        let collector = Arc::new(RecordingCollector::default());
        let pipeline = Pipeline::with_collector(config(), collector.clone()).unwrap();

        assert!(!pipeline.add_business_event("usd", 100, "gems", "pack", None));
        assert!(pipeline.add_business_event("USD", 100, "gems", "pack", None));
        assert!(pipeline.shutdown());

        let categories: Vec<String> = collector
            .batches
            .lock()
            .iter()
            .flatten()
            .filter_map(|e| e["category"].as_str().map(str::to_string))
            .collect();
        assert_eq!(categories.iter().filter(|c| *c == "business").count(), 1);
    }

    #[test]
    fn test_allow_lists_apply_immediately() {
        let pipeline =
            Pipeline::with_collector(config(), Arc::new(RecordingCollector::default())).unwrap();
        pipeline.set_available_custom_dimension_values(
            DimensionSlot::First,
            vec!["ninja".to_string(), "samurai".to_string()],
        );

        assert!(!pipeline.set_custom_dimension(DimensionSlot::First, Some("pirate")));
        assert!(pipeline.set_custom_dimension(DimensionSlot::First, Some("ninja")));
        assert!(pipeline.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(
            pipeline.context().custom_dimension(DimensionSlot::First).as_deref(),
            Some("ninja")
        );
    }

    #[test]
    fn test_calls_after_shutdown_are_ignored() {
        let pipeline =
            Pipeline::with_collector(config(), Arc::new(RecordingCollector::default())).unwrap();
        assert!(pipeline.shutdown());
        assert!(pipeline.shutdown());

        assert!(!pipeline.add_design_event("level:start", None));
        assert!(!pipeline.flush());
        assert!(!pipeline.wait_until_idle(Duration::from_millis(10)));
    }
}
