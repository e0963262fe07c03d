//! Event types accepted from the host application
//!
//! A [`GameEvent`] is the typed, not yet annotated form of an analytics
//! event. The worker turns it into a transport-ready JSON object by merging
//! session annotations on top of [`GameEvent::to_fields`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::sdk_error::SdkErrorArea;

/// Wire categories understood by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Session start (the collector calls it a "user" event)
    User,
    SessionEnd,
    Business,
    Resource,
    Progression,
    Design,
    Error,
    SdkError,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::User => "user",
            EventCategory::SessionEnd => "session_end",
            EventCategory::Business => "business",
            EventCategory::Resource => "resource",
            EventCategory::Progression => "progression",
            EventCategory::Design => "design",
            EventCategory::Error => "error",
            EventCategory::SdkError => "sdk_error",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a resource change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowType {
    /// Resource gained
    Source,
    /// Resource spent, stored as a negative amount
    Sink,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Source => "Source",
            FlowType::Sink => "Sink",
        }
    }
}

/// Progression status for progression events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressionStatus {
    Start,
    Complete,
    Fail,
}

impl ProgressionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressionStatus::Start => "Start",
            ProgressionStatus::Complete => "Complete",
            ProgressionStatus::Fail => "Fail",
        }
    }
}

/// Severity of a host-reported error event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Debug => "debug",
            ErrorSeverity::Info => "info",
            ErrorSeverity::Warning => "warning",
            ErrorSeverity::Error => "error",
            ErrorSeverity::Critical => "critical",
        }
    }
}

/// Failure to turn an event into JSON
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),
}

/// Analytics event as supplied by the host, before annotation
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Business {
        currency: String,
        amount: i64,
        item_type: String,
        item_id: String,
        cart_type: Option<String>,
    },
    Resource {
        flow_type: FlowType,
        currency: String,
        amount: f64,
        item_type: String,
        item_id: String,
    },
    Progression {
        status: ProgressionStatus,
        progression01: String,
        progression02: Option<String>,
        progression03: Option<String>,
        score: Option<f64>,
    },
    Design {
        event_id: String,
        value: Option<f64>,
    },
    Error {
        severity: ErrorSeverity,
        message: String,
    },
}

impl GameEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            GameEvent::Business { .. } => EventCategory::Business,
            GameEvent::Resource { .. } => EventCategory::Resource,
            GameEvent::Progression { .. } => EventCategory::Progression,
            GameEvent::Design { .. } => EventCategory::Design,
            GameEvent::Error { .. } => EventCategory::Error,
        }
    }

    /// Area used when reporting validation failures for this event kind
    pub fn sdk_error_area(&self) -> SdkErrorArea {
        match self {
            GameEvent::Business { .. } => SdkErrorArea::BusinessEvent,
            GameEvent::Resource { .. } => SdkErrorArea::ResourceEvent,
            GameEvent::Progression { .. } => SdkErrorArea::ProgressionEvent,
            GameEvent::Design { .. } => SdkErrorArea::DesignEvent,
            GameEvent::Error { .. } => SdkErrorArea::ErrorEvent,
        }
    }

    /// Resource amount with the sink sign applied
    pub fn signed_amount(flow_type: FlowType, amount: f64) -> f64 {
        match flow_type {
            FlowType::Source => amount,
            FlowType::Sink => -amount,
        }
    }

    /// Progression path without the status prefix, e.g. `world1:level2`
    pub fn progression_path(&self) -> Option<String> {
        match self {
            GameEvent::Progression {
                progression01,
                progression02,
                progression03,
                ..
            } => {
                let mut path = progression01.clone();
                for part in [progression02, progression03].into_iter().flatten() {
                    path.push(':');
                    path.push_str(part);
                }
                Some(path)
            }
            _ => None,
        }
    }

    /// Event-specific fields, without session annotations.
    ///
    /// Stateful fields (`transaction_num`, `attempt_num`) are added by the
    /// worker because they depend on session counters.
    pub fn to_fields(&self) -> Result<Map<String, Value>, EncodeError> {
        let mut out = Map::new();
        out.insert("category".into(), self.category().as_str().into());

        match self {
            GameEvent::Business {
                currency,
                amount,
                item_type,
                item_id,
                cart_type,
            } => {
                out.insert("event_id".into(), format!("{}:{}", item_type, item_id).into());
                out.insert("amount".into(), (*amount).into());
                out.insert("currency".into(), currency.clone().into());
                if let Some(cart) = cart_type.as_deref().filter(|c| !c.is_empty()) {
                    out.insert("cart_type".into(), cart.into());
                }
            }
            GameEvent::Resource {
                flow_type,
                currency,
                amount,
                item_type,
                item_id,
            } => {
                out.insert(
                    "event_id".into(),
                    format!("{}:{}:{}:{}", flow_type.as_str(), currency, item_type, item_id).into(),
                );
                let signed = Self::signed_amount(*flow_type, *amount);
                out.insert("amount".into(), finite(signed, "amount")?);
            }
            GameEvent::Progression { status, score, .. } => {
                let path = self.progression_path().unwrap_or_default();
                out.insert("event_id".into(), format!("{}:{}", status.as_str(), path).into());
                if let Some(score) = score {
                    out.insert("score".into(), finite(*score, "score")?);
                }
            }
            GameEvent::Design { event_id, value } => {
                out.insert("event_id".into(), event_id.clone().into());
                if let Some(value) = value {
                    out.insert("value".into(), finite(*value, "value")?);
                }
            }
            GameEvent::Error { severity, message } => {
                out.insert("severity".into(), severity.as_str().into());
                out.insert("message".into(), message.clone().into());
            }
        }

        Ok(out)
    }
}

fn finite(value: f64, field: &'static str) -> Result<Value, EncodeError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or(EncodeError::NonFinite(field))
}
