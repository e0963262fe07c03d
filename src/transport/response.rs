//! Collector response classification

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one HTTP exchange with the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpResponseKind {
    Ok,
    Created,
    BadRequest,
    Unauthorized,
    RequestTimeout,
    InternalServerError,
    UnknownResponseCode,
    JsonEncodeFailed,
    JsonDecodeFailed,
    NoResponse,
}

impl HttpResponseKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => HttpResponseKind::Ok,
            201 => HttpResponseKind::Created,
            400 => HttpResponseKind::BadRequest,
            401 => HttpResponseKind::Unauthorized,
            408 => HttpResponseKind::RequestTimeout,
            500..=599 => HttpResponseKind::InternalServerError,
            _ => HttpResponseKind::UnknownResponseCode,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HttpResponseKind::Ok | HttpResponseKind::Created)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpResponseKind::Ok => "ok",
            HttpResponseKind::Created => "created",
            HttpResponseKind::BadRequest => "bad_request",
            HttpResponseKind::Unauthorized => "unauthorized",
            HttpResponseKind::RequestTimeout => "request_timeout",
            HttpResponseKind::InternalServerError => "internal_server_error",
            HttpResponseKind::UnknownResponseCode => "unknown_response_code",
            HttpResponseKind::JsonEncodeFailed => "json_encode_failed",
            HttpResponseKind::JsonDecodeFailed => "json_decode_failed",
            HttpResponseKind::NoResponse => "no_response",
        }
    }
}

impl fmt::Display for HttpResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with a batch after the collector answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDisposition {
    Acknowledge,
    /// The collector refused the content; resending cannot help
    Discard,
    Requeue,
}

impl From<HttpResponseKind> for BatchDisposition {
    fn from(kind: HttpResponseKind) -> Self {
        match kind {
            HttpResponseKind::Ok | HttpResponseKind::Created => BatchDisposition::Acknowledge,
            HttpResponseKind::BadRequest => BatchDisposition::Discard,
            _ => BatchDisposition::Requeue,
        }
    }
}

/// One remote configuration entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfigEntry {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<i64>,
}

/// Body of an accepted init response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_variant_id: Option<String>,
    #[serde(default, alias = "configs")]
    pub configurations: Vec<RemoteConfigEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ts: Option<i64>,
}

impl InitResponse {
    /// Parse an init body; an empty object counts as no payload
    pub fn parse(body: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(body)?;
        match &value {
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(_) => serde_json::from_value(value).map(Some),
            _ => Ok(None),
        }
    }
}

/// Classified init exchange
#[derive(Debug, Clone, PartialEq)]
pub struct InitOutcome {
    pub kind: HttpResponseKind,
    pub body: Option<InitResponse>,
}

impl InitOutcome {
    pub fn new(kind: HttpResponseKind, body: Option<InitResponse>) -> Self {
        Self { kind, body }
    }

    pub fn failed(kind: HttpResponseKind) -> Self {
        Self { kind, body: None }
    }

    /// Accepted with a usable payload
    pub fn accepted(&self) -> Option<&InitResponse> {
        if self.kind.is_success() {
            self.body.as_ref()
        } else {
            None
        }
    }
}
