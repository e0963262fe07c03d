//! The worker loop
//!
//! Runs on its own thread inside a current-thread tokio runtime. It is the
//! only code that mutates the event store and the session context, and it
//! executes tasks strictly in queue order.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{DeviceInfo, PipelineConfig};
use crate::context::{
    event_annotations, init_annotations, sdk_error_annotations, ContextHandle, SessionState,
};
use crate::event_store::{EventStore, StoreError};
use crate::pipeline::{RemoteConfigsListener, SessionHooks};
use crate::transport::{BatchDisposition, Collector, HttpResponseKind};
use crate::types::{
    CustomFields, ErrorSeverity, EventCategory, GameEvent, ProgressionStatus, SdkError,
    SdkErrorAction, SdkErrorArea, SdkErrorCategory,
};
use crate::utils::{adjusted_timestamp, current_timestamp};
use crate::validation::{check_progression_order, clean_custom_fields, ProgressionOrderPolicy};

use super::queue::TaskQueue;
use super::rate_limit::SdkErrorLimiter;
use super::task::{Setting, Task};
use super::WorkerHandle;

/// How long shutdown waits for outstanding self-error reports
const REPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Worker knobs taken from the pipeline configuration
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub device: DeviceInfo,
    /// Where `state.json` lives; `None` disables persistence
    pub data_dir: Option<PathBuf>,
    pub flush_interval: Duration,
    pub flush_threshold: usize,
    pub max_batch_size: usize,
    pub flush_on_shutdown: bool,
    pub progression_order_policy: ProgressionOrderPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            device: config.device.clone(),
            data_dir: config.data_dir.clone(),
            flush_interval: config.flush_interval,
            flush_threshold: config.flush_threshold.max(1),
            max_batch_size: config.limits.max_batch_size,
            flush_on_shutdown: config.flush_on_shutdown,
            progression_order_policy: config.progression_order_policy,
        }
    }
}

enum Control {
    Continue,
    Stop,
}

pub struct Worker {
    queue: Arc<TaskQueue>,
    context: ContextHandle,
    store: EventStore,
    collector: Arc<dyn Collector>,
    settings: WorkerSettings,
    limiter: SdkErrorLimiter,
    hooks: Option<Arc<dyn SessionHooks>>,
    listeners: Vec<Arc<dyn RemoteConfigsListener>>,
    /// The user id was generated by this process and no hook heard about it yet
    new_user_pending: bool,
    force_stop: Arc<AtomicBool>,
    reports: JoinSet<()>,
    startup_errors: Vec<SdkError>,
}

impl Worker {
    pub fn new(
        queue: Arc<TaskQueue>,
        context: ContextHandle,
        store: EventStore,
        collector: Arc<dyn Collector>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            context,
            store,
            collector,
            settings,
            limiter: SdkErrorLimiter::default(),
            hooks: None,
            listeners: Vec::new(),
            new_user_pending: false,
            force_stop: Arc::new(AtomicBool::new(false)),
            reports: JoinSet::new(),
            startup_errors: Vec::new(),
        }
    }

    /// Mark the user id as freshly generated
    pub fn with_new_user(mut self, new_user: bool) -> Self {
        self.new_user_pending = new_user;
        self
    }

    /// Self-error to report as soon as the worker runs
    pub fn report_on_start(&mut self, error: SdkError) {
        self.startup_errors.push(error);
    }

    /// Move the worker onto its own thread
    pub fn spawn(self) -> io::Result<WorkerHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let queue = Arc::clone(&self.queue);
        let force_stop = Arc::clone(&self.force_stop);
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("telemetry-worker".to_string())
            .spawn(move || {
                runtime.block_on(self.run());
                let _ = done_tx.send(());
            })?;

        Ok(WorkerHandle::new(queue, force_stop, done_rx, thread))
    }

    async fn run(mut self) {
        info!(
            pending = self.store.len(),
            durable = self.store.is_durable(),
            "telemetry worker started"
        );
        for error in std::mem::take(&mut self.startup_errors) {
            self.report_sdk_error(error);
        }

        let period = self.settings.flush_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'outer: loop {
            while let Some(task) = self.queue.pop() {
                if self.force_stop.load(Ordering::SeqCst) {
                    break 'outer;
                }
                if let Control::Stop = self.handle(task).await {
                    break 'outer;
                }
            }
            if self.force_stop.load(Ordering::SeqCst) {
                break;
            }
            if self.queue.is_closed() && self.queue.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.queue.notified() => {}
                _ = ticker.tick() => {
                    self.queue.push(Task::Flush);
                }
                Some(_) = self.reports.join_next(), if !self.reports.is_empty() => {}
            }
        }

        if self.force_stop.load(Ordering::SeqCst) {
            warn!(
                abandoned = self.queue.len(),
                "worker force-stopped, unsent records stay in the store"
            );
        }
        self.persist();
        let stats = self.store.stats();
        info!(
            pending = stats.total(),
            acknowledged = stats.acknowledged,
            dropped = stats.dropped(),
            "telemetry worker stopped"
        );
    }

    async fn handle(&mut self, task: Task) -> Control {
        debug!(task = ?task, "running task");
        match task {
            Task::StartSession => self.start_session().await,
            Task::EndSession => self.end_session(true).await,
            Task::AddEvent { event, fields } => self.add_event(event, fields).await,
            Task::ReportSdkError(error) => self.report_sdk_error(error),
            Task::SetCustomDimension { slot, value } => {
                self.context.write().set_custom_dimension(slot, value);
            }
            Task::SetGlobalCustomFields(fields) => {
                self.context.write().global_fields = fields;
            }
            Task::SetFlag(setting) => self.apply_setting(setting),
            Task::SetHooks(hooks) => {
                self.hooks = hooks;
                self.notify_new_user();
            }
            Task::AddRemoteConfigsListener(listener) => {
                if !self.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                    self.listeners.push(listener);
                }
            }
            Task::RemoveRemoteConfigsListener(listener) => {
                self.listeners.retain(|l| !Arc::ptr_eq(l, &listener));
            }
            Task::ReportPanic(message) => self.report_panic(message).await,
            Task::Flush => self.flush().await,
            Task::Sync(done) => {
                let _ = done.send(());
            }
            Task::Shutdown => {
                self.shutdown().await;
                return Control::Stop;
            }
        }
        Control::Continue
    }

    async fn start_session(&mut self) {
        match self.context.session_state() {
            SessionState::Active => {
                info!("session already active, ending it before starting a new one");
                self.end_session(false).await;
            }
            SessionState::InitPending => {
                debug!("session init already in progress");
                return;
            }
            SessionState::Idle | SessionState::Ended => {}
        }

        let body = {
            let mut ctx = self.context.write();
            ctx.begin_session();
            Value::Object(init_annotations(&ctx, &self.settings.device))
        };

        let outcome = self.collector.request_init(&body).await;
        let Some(response) = outcome.accepted() else {
            self.context.write().abort_session();
            match outcome.kind {
                HttpResponseKind::Ok | HttpResponseKind::Created => {
                    warn!("init response carried no payload, session stays idle");
                }
                HttpResponseKind::JsonDecodeFailed => {
                    warn!("init response could not be decoded, session stays idle");
                    self.report_sdk_error(SdkError::new(
                        SdkErrorCategory::Json,
                        SdkErrorArea::InitHttp,
                        SdkErrorAction::FailHttpJsonDecode,
                        None,
                        "init response is not valid JSON",
                    ));
                }
                kind => warn!(kind = %kind, "session init failed, session stays idle"),
            }
            return;
        };

        let local_ts = current_timestamp();
        let (session_id, session_num, payload) = {
            let mut ctx = self.context.write();
            ctx.apply_init_response(response, local_ts);
            let now = adjusted_timestamp(ctx.server_time_offset);
            ctx.activate_session(now);

            let mut payload = event_annotations(&ctx, &self.settings.device, now);
            payload.insert("category".into(), EventCategory::User.as_str().into());
            let payload = ctx.event_submission_enabled.then_some(payload);
            (ctx.session_id.clone().unwrap_or_default(), ctx.session_num, payload)
        };
        info!(session_id = %session_id, session_num, "session started");

        self.persist();
        self.notify_remote_configs();
        self.notify_new_user();
        if let Some(hooks) = &self.hooks {
            hooks.on_session_start(&session_id, session_num);
        }
        if let Some(payload) = payload {
            self.store_event(payload);
        }
        self.flush().await;
    }

    async fn end_session(&mut self, flush: bool) {
        if !self.context.is_session_active() {
            debug!("no active session to end");
            return;
        }

        let (session_id, length, payload) = {
            let mut ctx = self.context.write();
            let now = adjusted_timestamp(ctx.server_time_offset);
            let length = ctx.current_session_length(now);

            let mut payload = event_annotations(&ctx, &self.settings.device, now);
            payload.insert("category".into(), EventCategory::SessionEnd.as_str().into());
            payload.insert("length".into(), length.into());
            let payload = ctx.event_submission_enabled.then_some(payload);

            let session_id = ctx.session_id.clone().unwrap_or_default();
            ctx.end_session(now);
            (session_id, length, payload)
        };
        info!(session_id = %session_id, length, "session ended");

        if let Some(payload) = payload {
            self.store_event(payload);
        }
        self.persist();
        if let Some(hooks) = &self.hooks {
            hooks.on_session_end(&session_id, length);
        }
        if flush {
            self.flush().await;
        }
    }

    async fn add_event(&mut self, event: GameEvent, fields: CustomFields) {
        if !self.context.is_session_active() {
            warn!(category = %event.category(), "no active session, dropping event");
            return;
        }
        if !self.context.read().event_submission_enabled {
            debug!(category = %event.category(), "event submission disabled, dropping event");
            return;
        }

        let progression_path = event.progression_path();
        if let (GameEvent::Progression { status, .. }, Some(path)) = (&event, &progression_path) {
            let started = self.context.read().progression.is_started(path);
            if let Err(rejection) = check_progression_order(*status, path, started) {
                warn!(%rejection, "progression event out of order");
                self.report_sdk_error(rejection);
                if self.settings.progression_order_policy == ProgressionOrderPolicy::Reject {
                    return;
                }
            }
        }

        let mut event_fields = match event.to_fields() {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, "could not encode event, dropping it");
                self.report_sdk_error(SdkError::new(
                    SdkErrorCategory::Json,
                    event.sdk_error_area(),
                    SdkErrorAction::JsonError,
                    None,
                    e.to_string(),
                ));
                return;
            }
        };

        let payload = {
            let mut ctx = self.context.write();
            match (&event, &progression_path) {
                (GameEvent::Business { .. }, _) => {
                    let transaction_num = ctx.next_transaction_num();
                    event_fields.insert("transaction_num".into(), transaction_num.into());
                }
                (GameEvent::Progression { status, .. }, Some(path)) => match status {
                    ProgressionStatus::Start => ctx.progression.mark_started(path.clone()),
                    ProgressionStatus::Fail => {
                        ctx.progression.increment(path);
                    }
                    ProgressionStatus::Complete => {
                        let attempt_num = ctx.progression.increment(path);
                        event_fields.insert("attempt_num".into(), attempt_num.into());
                        ctx.progression.remove(path);
                        ctx.progression.mark_finished(path);
                    }
                },
                _ => {}
            }

            let now = adjusted_timestamp(ctx.server_time_offset);
            let mut payload = event_annotations(&ctx, &self.settings.device, now);
            payload.extend(event_fields);

            let mut custom = ctx.global_fields.clone();
            custom.merge(&fields);
            let cleaned = clean_custom_fields(&custom);
            if !cleaned.dropped.is_empty() {
                warn!(dropped = ?cleaned.dropped, "custom fields over the limit were dropped");
            }
            if !cleaned.fields.is_empty() {
                payload.insert(
                    "custom_fields".into(),
                    Value::Object(cleaned.fields.to_json()),
                );
            }
            payload
        };

        let stored = self.store_event(payload);
        if stored && matches!(event, GameEvent::Business { .. } | GameEvent::Progression { .. }) {
            self.persist();
        }
        if self.store.pending_count() >= self.settings.flush_threshold {
            self.flush().await;
        }
    }

    /// Queue a panic as a critical error event and send it right away
    async fn report_panic(&mut self, message: String) {
        if !self.context.read().error_reporting_enabled {
            debug!("error reporting disabled, not reporting panic");
            return;
        }
        info!("reporting panic as a critical error event");
        let event = GameEvent::Error {
            severity: ErrorSeverity::Critical,
            message,
        };
        self.add_event(event, CustomFields::new()).await;
        self.flush().await;
    }

    fn notify_remote_configs(&self) {
        if self.listeners.is_empty() {
            return;
        }
        let configs = self.context.remote_configs();
        debug!(listeners = self.listeners.len(), "remote configs updated");
        for listener in &self.listeners {
            listener.on_remote_configs_updated(&configs);
        }
    }

    /// Append an annotated payload to the store; returns whether it was kept
    fn store_event(&mut self, payload: Map<String, Value>) -> bool {
        match self.store.append(Value::Object(payload)) {
            Ok(outcome) => {
                debug!(seq = outcome.seq, "event queued");
                if !outcome.evicted.is_empty() {
                    self.report_sdk_error(SdkError::new(
                        SdkErrorCategory::Database,
                        SdkErrorArea::AddEventsToStore,
                        SdkErrorAction::DatabaseTooLarge,
                        None,
                        format!("store full, evicted {} oldest records", outcome.evicted.len()),
                    ));
                }
                true
            }
            Err(StoreError::RecordTooLarge { size, limit }) => {
                warn!(size, limit, "event too large, dropping it");
                self.report_sdk_error(SdkError::new(
                    SdkErrorCategory::Database,
                    SdkErrorArea::AddEventsToStore,
                    SdkErrorAction::DatabaseTooLarge,
                    None,
                    format!("record of {} bytes exceeds {} bytes", size, limit),
                ));
                false
            }
            Err(StoreError::Json(e)) => {
                warn!(error = %e, "could not serialize event, dropping it");
                self.report_sdk_error(SdkError::new(
                    SdkErrorCategory::Json,
                    SdkErrorArea::AddEventsToStore,
                    SdkErrorAction::JsonError,
                    None,
                    e.to_string(),
                ));
                false
            }
            Err(StoreError::Io(e)) => {
                error!(error = %e, "could not write event to the store");
                self.report_sdk_error(SdkError::new(
                    SdkErrorCategory::Database,
                    SdkErrorArea::AddEventsToStore,
                    SdkErrorAction::DatabaseOpenOrCreate,
                    None,
                    e.to_string(),
                ));
                false
            }
        }
    }

    /// Send pending records in batches until the store is drained or a batch fails
    async fn flush(&mut self) {
        if !self.context.read().init_authorized {
            debug!("collector has not accepted an init yet, keeping events queued");
            return;
        }

        let reset = self.store.reset_failed();
        if reset > 0 {
            debug!(count = reset, "retrying failed records");
        }

        loop {
            if self.force_stop.load(Ordering::SeqCst) {
                break;
            }
            let batch = self.store.take_batch(self.settings.max_batch_size);
            if batch.is_empty() {
                break;
            }

            let seqs: Vec<u64> = batch.iter().map(|r| r.seq).collect();
            let payloads: Vec<Value> = batch.into_iter().map(|r| r.payload).collect();
            let kind = self.collector.send_events(&payloads).await;

            let result = match BatchDisposition::from(kind) {
                BatchDisposition::Acknowledge => self.store.acknowledge(&seqs).map(|count| {
                    debug!(count, "batch delivered");
                    true
                }),
                BatchDisposition::Discard => {
                    warn!(count = seqs.len(), "collector rejected batch, dropping it");
                    self.store.discard(&seqs).map(|_| true)
                }
                BatchDisposition::Requeue => {
                    warn!(kind = %kind, count = seqs.len(), "batch delivery failed, will retry");
                    self.store.requeue(&seqs).map(|_| false)
                }
            };

            match result {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    error!(error = %e, "could not update the store after delivery");
                    self.store.release_in_flight();
                    break;
                }
            }
        }
    }

    /// Send a rate-limited `sdk_error` report without waiting for it
    fn report_sdk_error(&mut self, error: SdkError) {
        let payload = {
            let ctx = self.context.read();
            if !ctx.error_reporting_enabled {
                return;
            }
            if !self.limiter.should_report(error.rate_key(), chrono::Utc::now()) {
                debug!(%error, "sdk error suppressed by rate limit");
                return;
            }
            let now = adjusted_timestamp(ctx.server_time_offset);
            Value::Object(sdk_error_annotations(&ctx, &self.settings.device, &error, now))
        };

        debug!(%error, "reporting sdk error");
        let collector = Arc::clone(&self.collector);
        self.reports.spawn(async move {
            let events = [payload];
            let kind = collector.send_events(&events).await;
            if !kind.is_success() {
                debug!(kind = %kind, "sdk error report not accepted");
            }
        });
    }

    fn apply_setting(&mut self, setting: Setting) {
        let mut ctx = self.context.write();
        match setting {
            Setting::EventSubmission(enabled) => ctx.event_submission_enabled = enabled,
            Setting::ErrorReporting(enabled) => ctx.error_reporting_enabled = enabled,
            Setting::ManualSessionHandling(manual) => ctx.manual_session_handling = manual,
            Setting::Build(build) => ctx.build = build,
            Setting::ExternalUserId(id) => ctx.external_user_id = id.filter(|id| !id.is_empty()),
        }
    }

    fn notify_new_user(&mut self) {
        if !self.new_user_pending {
            return;
        }
        if let Some(hooks) = &self.hooks {
            hooks.on_new_user(&self.context.user_id());
            self.new_user_pending = false;
        }
    }

    fn persist(&self) {
        let Some(dir) = &self.settings.data_dir else {
            return;
        };
        let state = self.context.read().to_persisted();
        if let Err(e) = state.save(dir) {
            warn!(error = %e, "could not save session state");
        }
    }

    async fn shutdown(&mut self) {
        info!("telemetry worker shutting down");
        let manual = self.context.read().manual_session_handling;
        if !manual && self.context.is_session_active() {
            self.end_session(false).await;
        }
        if self.settings.flush_on_shutdown {
            self.flush().await;
        }
        self.persist();

        let reports = &mut self.reports;
        let drained = tokio::time::timeout(REPORT_DRAIN_TIMEOUT, async {
            while reports.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            debug!("gave up waiting for sdk error reports");
        }
    }
}
