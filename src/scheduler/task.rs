//! Units of work executed by the worker

use std::fmt;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use crate::pipeline::{RemoteConfigsListener, SessionHooks};
use crate::types::{CustomFields, DimensionSlot, GameEvent, SdkError};

/// Runtime switches the host can flip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    EventSubmission(bool),
    ErrorReporting(bool),
    ManualSessionHandling(bool),
    Build(String),
    /// `None` clears it
    ExternalUserId(Option<String>),
}

pub enum Task {
    StartSession,
    EndSession,
    /// Validated event plus its cleaned custom fields
    AddEvent {
        event: GameEvent,
        fields: CustomFields,
    },
    ReportSdkError(SdkError),
    SetCustomDimension {
        slot: DimensionSlot,
        value: Option<String>,
    },
    SetGlobalCustomFields(CustomFields),
    SetFlag(Setting),
    SetHooks(Option<Arc<dyn SessionHooks>>),
    AddRemoteConfigsListener(Arc<dyn RemoteConfigsListener>),
    RemoveRemoteConfigsListener(Arc<dyn RemoteConfigsListener>),
    /// Description of a panic caught by the installed panic hook
    ReportPanic(String),
    Flush,
    /// Answered once every earlier task has run
    Sync(SyncSender<()>),
    Shutdown,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::StartSession => "start_session",
            Task::EndSession => "end_session",
            Task::AddEvent { .. } => "add_event",
            Task::ReportSdkError(_) => "report_sdk_error",
            Task::SetCustomDimension { .. } => "set_custom_dimension",
            Task::SetGlobalCustomFields(_) => "set_global_custom_fields",
            Task::SetFlag(_) => "set_flag",
            Task::SetHooks(_) => "set_hooks",
            Task::AddRemoteConfigsListener(_) => "add_remote_configs_listener",
            Task::RemoveRemoteConfigsListener(_) => "remove_remote_configs_listener",
            Task::ReportPanic(_) => "report_panic",
            Task::Flush => "flush",
            Task::Sync(_) => "sync",
            Task::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::AddEvent { event, .. } => write!(f, "AddEvent({})", event.category()),
            Task::ReportSdkError(err) => write!(f, "ReportSdkError({})", err),
            Task::SetFlag(setting) => write!(f, "SetFlag({:?})", setting),
            other => f.write_str(other.name()),
        }
    }
}
