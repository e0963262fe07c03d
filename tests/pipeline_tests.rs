//! End-to-end tests for the telemetry pipeline against a scripted collector

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

use game_telemetry::transport::{InitOutcome, InitResponse, RemoteConfigEntry};
use game_telemetry::{
    Collector, CustomFields, DimensionSlot, EventStore, FlowType, HttpResponseKind, Pipeline,
    PipelineConfig, ProgressionStatus, RemoteConfigsListener, SessionHooks, SessionState,
    StoreLimits,
};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Collector that records everything and answers from a script
struct ScriptedCollector {
    init_script: Mutex<VecDeque<HttpResponseKind>>,
    init_body: Mutex<InitResponse>,
    events_response: Mutex<HttpResponseKind>,
    events_delay: Mutex<Duration>,
    init_requests: Mutex<Vec<Value>>,
    batches: Mutex<Vec<Vec<Value>>>,
}

impl ScriptedCollector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            init_script: Mutex::new(VecDeque::new()),
            init_body: Mutex::new(InitResponse::default()),
            events_response: Mutex::new(HttpResponseKind::Ok),
            events_delay: Mutex::new(Duration::ZERO),
            init_requests: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        })
    }

    fn script_init(&self, kinds: &[HttpResponseKind]) {
        self.init_script.lock().extend(kinds.iter().copied());
    }

    fn respond_to_events_with(&self, kind: HttpResponseKind) {
        *self.events_response.lock() = kind;
    }

    /// Make every later events request take `delay` before answering
    fn delay_events_by(&self, delay: Duration) {
        *self.events_delay.lock() = delay;
    }

    /// Delivered events, excluding self-error reports
    fn events(&self) -> Vec<Value> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter(|e| e["category"] != "sdk_error")
            .cloned()
            .collect()
    }

    fn events_of(&self, category: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e["category"] == category)
            .collect()
    }

    fn sdk_errors(&self) -> Vec<Value> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter(|e| e["category"] == "sdk_error")
            .cloned()
            .collect()
    }
}

impl Collector for ScriptedCollector {
    fn request_init<'a>(&'a self, body: &'a Value) -> BoxFuture<'a, InitOutcome> {
        self.init_requests.lock().push(body.clone());
        let kind = self
            .init_script
            .lock()
            .pop_front()
            .unwrap_or(HttpResponseKind::Ok);
        let outcome = if kind.is_success() {
            InitOutcome::new(kind, Some(self.init_body.lock().clone()))
        } else {
            InitOutcome::failed(kind)
        };
        async move { outcome }.boxed()
    }

    fn send_events<'a>(&'a self, events: &'a [Value]) -> BoxFuture<'a, HttpResponseKind> {
        self.batches.lock().push(events.to_vec());
        let kind = *self.events_response.lock();
        let delay = *self.events_delay.lock();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            kind
        }
        .boxed()
    }
}

#[derive(Default)]
struct RecordingHooks {
    calls: Mutex<Vec<String>>,
}

impl SessionHooks for RecordingHooks {
    fn on_new_user(&self, _user_id: &str) {
        self.calls.lock().push("new_user".to_string());
    }

    fn on_session_start(&self, _session_id: &str, session_num: u64) {
        self.calls.lock().push(format!("start:{}", session_num));
    }

    fn on_session_end(&self, _session_id: &str, _length_secs: i64) {
        self.calls.lock().push("end".to_string());
    }
}

#[derive(Default)]
struct RecordingListener {
    updates: Mutex<Vec<Value>>,
}

impl RemoteConfigsListener for RecordingListener {
    fn on_remote_configs_updated(&self, configs: &Value) {
        self.updates.lock().push(configs.clone());
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig::new("gamekey123", "secret456")
        .with_flush_interval(Duration::from_secs(3600))
        .with_build("1.0.0")
}

fn start(config: PipelineConfig, collector: &Arc<ScriptedCollector>) -> Pipeline {
    Pipeline::with_collector(config, collector.clone()).unwrap()
}

/// Self-error reports run concurrently with the queue, so poll for them
fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + IDLE_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_session_start_sends_init_and_user_event() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(pipeline.context().session_state(), SessionState::Active);
    assert_eq!(pipeline.context().session_num(), 1);

    let init = collector.init_requests.lock()[0].clone();
    assert_eq!(init["session_num"], 1);
    assert_eq!(init["build"], "1.0.0");
    assert_eq!(init["user_id"], json!(pipeline.context().user_id()));

    let users = collector.events_of("user");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["v"], 2);
    assert_eq!(users[0]["session_id"], json!(pipeline.context().session_id()));
    assert!(users[0]["event_uuid"].is_string());
}

#[test]
fn test_sink_resource_amount_is_negated() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    assert!(pipeline.add_resource_event(FlowType::Sink, "gems", 10.0, "boost", "potion"));
    assert!(pipeline.flush());
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let resources = collector.events_of("resource");
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["amount"], json!(-10.0));
    assert_eq!(resources[0]["event_id"], "Sink:gems:boost:potion");
}

#[test]
fn test_progression_attempts_are_counted() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);
    let path = "world1:level2";

    pipeline.add_progression_event(ProgressionStatus::Start, "world1", Some("level2"), None, None);
    pipeline.add_progression_event(ProgressionStatus::Fail, "world1", Some("level2"), None, None);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(pipeline.context().progression_tries(path), 1);

    pipeline.add_progression_event(ProgressionStatus::Fail, "world1", Some("level2"), None, None);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(pipeline.context().progression_tries(path), 2);

    pipeline.add_progression_event(
        ProgressionStatus::Complete,
        "world1",
        Some("level2"),
        None,
        Some(1500.0),
    );
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(pipeline.context().progression_tries(path), 0);

    let complete: Vec<Value> = collector
        .events_of("progression")
        .into_iter()
        .filter(|e| e["event_id"] == "Complete:world1:level2")
        .collect();
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["attempt_num"], 3);
    assert_eq!(complete[0]["score"], json!(1500.0));
}

#[test]
fn test_progression_without_start_is_reported() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    pipeline.add_progression_event(ProgressionStatus::Fail, "world9", None, None, None);
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert!(wait_for(|| collector
        .sdk_errors()
        .iter()
        .any(|e| e["error_action"] == "wrong_progression_order")));
    // Reported, not rejected
    assert_eq!(collector.events_of("progression").len(), 1);
}

#[test]
fn test_unauthorized_init_leaves_session_idle_until_retry() {
    let collector = ScriptedCollector::new();
    collector.script_init(&[HttpResponseKind::Unauthorized]);
    let pipeline = start(test_config(), &collector);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(pipeline.context().session_state(), SessionState::Idle);
    pipeline.add_design_event("menu:open", None);
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert!(collector.events().is_empty());

    assert!(pipeline.start_session());
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(pipeline.context().session_state(), SessionState::Active);
    assert_eq!(pipeline.context().session_num(), 1);
    assert_eq!(collector.init_requests.lock().len(), 2);
    assert_eq!(collector.events_of("user").len(), 1);
    assert!(collector.events_of("design").is_empty());
}

#[test]
fn test_undelivered_events_survive_restart_in_order() {
    let dir = TempDir::new().unwrap();
    let limits = StoreLimits {
        max_attempts: 100,
        ..StoreLimits::default()
    };
    let collector = ScriptedCollector::new();
    collector.respond_to_events_with(HttpResponseKind::InternalServerError);

    let config = test_config()
        .with_data_dir(dir.path())
        .with_limits(limits)
        .with_flush_on_shutdown(false);
    let pipeline = start(config, &collector);
    for amount in 1..=5 {
        assert!(pipeline.add_business_event("USD", amount, "gems", "pack", None));
    }
    assert!(pipeline.end_session());
    assert!(pipeline.shutdown());
    drop(pipeline);

    let store = EventStore::open(dir.path(), limits).unwrap();
    let kept: Vec<&Value> = store
        .records()
        .map(|r| &r.payload)
        .filter(|p| p["category"] == "business" || p["category"] == "session_end")
        .collect();

    assert_eq!(kept.len(), 6);
    let amounts: Vec<i64> = kept[..5].iter().filter_map(|p| p["amount"].as_i64()).collect();
    assert_eq!(amounts, vec![1, 2, 3, 4, 5]);
    let transactions: Vec<u64> = kept[..5]
        .iter()
        .filter_map(|p| p["transaction_num"].as_u64())
        .collect();
    assert_eq!(transactions, vec![1, 2, 3, 4, 5]);
    assert_eq!(kept[5]["category"], "session_end");
}

#[test]
fn test_events_are_delivered_in_submission_order() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    for step in 0..20 {
        pipeline.add_design_event(&format!("tutorial:step:{}", step), Some(step as f64));
    }
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let ids: Vec<String> = collector
        .events_of("design")
        .iter()
        .filter_map(|e| e["event_id"].as_str().map(str::to_string))
        .collect();
    let expected: Vec<String> = (0..20).map(|s| format!("tutorial:step:{}", s)).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_failed_batch_is_redelivered_in_order_on_next_flush() {
    let collector = ScriptedCollector::new();
    collector.respond_to_events_with(HttpResponseKind::InternalServerError);
    let pipeline = start(test_config(), &collector);

    for step in 0..5 {
        pipeline.add_design_event(&format!("retry:step:{}", step), None);
    }
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(collector.events_of("design").len(), 5);

    let before = collector.batches.lock().len();
    collector.respond_to_events_with(HttpResponseKind::Ok);
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let redelivered: Vec<Value> = collector.batches.lock()[before..]
        .iter()
        .flatten()
        .filter(|e| e["category"] != "sdk_error")
        .cloned()
        .collect();
    let ids: Vec<&str> = redelivered
        .iter()
        .map(|e| e["event_id"].as_str().unwrap_or_else(|| e["category"].as_str().unwrap()))
        .collect();
    assert_eq!(
        ids,
        vec!["user", "retry:step:0", "retry:step:1", "retry:step:2", "retry:step:3", "retry:step:4"]
    );
}

#[test]
fn test_stuck_delivery_is_abandoned_after_drain_timeout() {
    let dir = TempDir::new().unwrap();
    let collector = ScriptedCollector::new();
    let config = test_config()
        .with_data_dir(dir.path())
        .with_drain_timeout(Duration::from_millis(100));
    let pipeline = start(config, &collector);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    collector.respond_to_events_with(HttpResponseKind::InternalServerError);
    collector.delay_events_by(Duration::from_millis(500));
    for step in 0..3 {
        pipeline.add_design_event(&format!("slow:step:{}", step), None);
    }

    let started = Instant::now();
    assert!(!pipeline.shutdown());
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(!pipeline.flush());

    // Let the detached worker finish its in-flight request and exit
    std::thread::sleep(Duration::from_millis(2_000));
    drop(pipeline);

    let store = EventStore::open(dir.path(), StoreLimits::default()).unwrap();
    let ids: Vec<&str> = store
        .records()
        .filter_map(|r| r.payload["event_id"].as_str())
        .collect();
    assert_eq!(ids, vec!["slow:step:0", "slow:step:1", "slow:step:2"]);
    assert!(store.records().any(|r| r.payload["category"] == "session_end"));
}

#[test]
fn test_bad_request_drops_batch() {
    let dir = TempDir::new().unwrap();
    let collector = ScriptedCollector::new();
    collector.respond_to_events_with(HttpResponseKind::BadRequest);

    let pipeline = start(test_config().with_data_dir(dir.path()), &collector);
    pipeline.add_design_event("shop:open", None);
    pipeline.flush();
    assert!(pipeline.shutdown());
    drop(pipeline);

    let store = EventStore::open(dir.path(), StoreLimits::default()).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_rejected_events_are_reported_once_per_window() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    assert!(!pipeline.add_business_event("usd", 100, "gems", "pack", None));
    assert!(!pipeline.add_business_event("dollars", 100, "gems", "pack", None));
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert!(wait_for(|| !collector.sdk_errors().is_empty()));
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let errors = collector.sdk_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error_category"], "event_validation");
    assert_eq!(errors[0]["error_area"], "business");
    assert_eq!(errors[0]["error_action"], "invalid_currency");
    assert!(collector.events_of("business").is_empty());
}

#[test]
fn test_error_reporting_can_be_disabled() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    pipeline.set_error_reporting_enabled(false);
    assert!(!pipeline.add_design_event("bad#event", None));
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    std::thread::sleep(Duration::from_millis(100));
    assert!(collector.sdk_errors().is_empty());
}

#[test]
fn test_event_submission_can_be_disabled() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    pipeline.set_event_submission_enabled(false);
    pipeline.add_design_event("ignored:event", None);
    pipeline.set_event_submission_enabled(true);
    pipeline.add_design_event("kept:event", None);
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let ids: Vec<Value> = collector
        .events_of("design")
        .iter()
        .map(|e| e["event_id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("kept:event")]);
}

#[test]
fn test_events_without_session_are_dropped() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config().with_manual_session_handling(true), &collector);

    pipeline.add_design_event("before:start", None);
    pipeline.start_session();
    pipeline.add_design_event("after:start", None);
    pipeline.end_session();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let ids: Vec<Value> = collector
        .events_of("design")
        .iter()
        .map(|e| e["event_id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("after:start")]);
    assert_eq!(collector.events_of("session_end").len(), 1);
    assert_eq!(pipeline.context().session_state(), SessionState::Ended);
}

#[test]
fn test_custom_fields_and_dimensions_are_annotated() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);

    pipeline.set_global_custom_fields(
        CustomFields::new()
            .with("region", "eu")
            .with("vip", true),
    );
    pipeline.set_custom_dimension(DimensionSlot::Second, Some("whale"));
    pipeline.add_event_with_fields(
        game_telemetry::GameEvent::Design {
            event_id: "boss:defeated".to_string(),
            value: None,
        },
        CustomFields::new().with("region", "us").with("level", 12i64),
    );
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let designs = collector.events_of("design");
    assert_eq!(designs.len(), 1);
    let fields = &designs[0]["custom_fields"];
    assert_eq!(fields["region"], "us");
    assert_eq!(fields["vip"], true);
    assert_eq!(fields["level"], 12);
    assert_eq!(designs[0]["custom_02"], "whale");
}

#[test]
fn test_init_response_populates_remote_configs() {
    let collector = ScriptedCollector::new();
    *collector.init_body.lock() = InitResponse {
        configs_hash: Some("hash-1".to_string()),
        ab_id: Some("exp_7".to_string()),
        ab_variant_id: Some("b".to_string()),
        configurations: vec![RemoteConfigEntry {
            key: "difficulty".to_string(),
            value: json!("hard"),
            start_ts: None,
            end_ts: None,
        }],
        server_ts: None,
    };
    let pipeline = start(test_config(), &collector);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    let context = pipeline.context();
    assert!(context.is_remote_configs_ready());
    assert_eq!(context.remote_config_string("difficulty", "easy"), "hard");
    assert_eq!(context.remote_config_string("missing", "easy"), "easy");
    assert_eq!(context.configs_hash().as_deref(), Some("hash-1"));

    let users = collector.events_of("user");
    assert_eq!(users[0]["ab_id"], "exp_7");
    assert_eq!(users[0]["ab_variant_id"], "b");
}

#[test]
fn test_remote_configs_listener_is_told_about_init_responses() {
    let collector = ScriptedCollector::new();
    *collector.init_body.lock() = InitResponse {
        configurations: vec![RemoteConfigEntry {
            key: "difficulty".to_string(),
            value: json!("hard"),
            start_ts: None,
            end_ts: None,
        }],
        ..InitResponse::default()
    };
    let recording = Arc::new(RecordingListener::default());
    let listener: Arc<dyn RemoteConfigsListener> = recording.clone();

    let pipeline = start(test_config().with_manual_session_handling(true), &collector);
    pipeline.add_remote_configs_listener(listener.clone());
    pipeline.add_remote_configs_listener(listener.clone());
    pipeline.start_session();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(*recording.updates.lock(), vec![json!({"difficulty": "hard"})]);

    pipeline.remove_remote_configs_listener(&listener);
    pipeline.start_session();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(pipeline.context().session_num(), 2);
    assert_eq!(recording.updates.lock().len(), 1);
}

#[test]
fn test_external_user_id_is_annotated_until_cleared() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config().with_external_user_id("steam:7656"), &collector);
    pipeline.add_design_event("lobby:join", None);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert!(!pipeline.set_external_user_id(&"x".repeat(65)));
    assert!(pipeline.set_external_user_id(""));
    pipeline.add_design_event("lobby:leave", None);
    pipeline.flush();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(collector.init_requests.lock()[0]["external_user_id"], "steam:7656");
    let designs = collector.events_of("design");
    assert_eq!(designs[0]["external_user_id"], "steam:7656");
    assert!(designs[1].get("external_user_id").is_none());
    assert_eq!(pipeline.context().external_user_id(), None);
}

#[test]
fn test_panics_are_reported_as_critical_errors() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));
    pipeline.install_panic_reporter();

    let crashed = std::thread::Builder::new()
        .name("render".to_string())
        .spawn(|| panic!("reactor overheated"))
        .unwrap()
        .join();
    assert!(crashed.is_err());

    assert!(wait_for(|| !collector.events_of("error").is_empty()));
    let errors = collector.events_of("error");
    assert_eq!(errors[0]["severity"], "critical");
    let message = errors[0]["message"].as_str().unwrap();
    assert!(message.contains("thread 'render'"));
    assert!(message.contains("reactor overheated"));
}

#[test]
fn test_identity_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let collector = ScriptedCollector::new();

    let first = start(test_config().with_data_dir(dir.path()), &collector);
    assert!(first.wait_until_idle(IDLE_TIMEOUT));
    let user_id = first.context().user_id();
    assert!(first.shutdown());
    drop(first);

    let second = start(test_config().with_data_dir(dir.path()), &collector);
    assert!(second.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(second.context().user_id(), user_id);
    assert_eq!(second.context().session_num(), 2);
}

#[test]
fn test_hooks_follow_session_lifecycle() {
    let dir = TempDir::new().unwrap();
    let collector = ScriptedCollector::new();
    let hooks = Arc::new(RecordingHooks::default());

    let pipeline = start(
        test_config()
            .with_data_dir(dir.path())
            .with_manual_session_handling(true),
        &collector,
    );
    pipeline.set_session_hooks(hooks.clone());
    pipeline.start_session();
    pipeline.end_session();
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert_eq!(
        *hooks.calls.lock(),
        vec!["new_user".to_string(), "start:1".to_string(), "end".to_string()]
    );
}

#[test]
fn test_shutdown_ends_automatic_session() {
    let collector = ScriptedCollector::new();
    let pipeline = start(test_config(), &collector);
    assert!(pipeline.wait_until_idle(IDLE_TIMEOUT));

    assert!(pipeline.shutdown());
    assert_eq!(collector.events_of("session_end").len(), 1);
    assert!(!pipeline.add_design_event("too:late", None));
}
