//! SDK self-error taxonomy
//!
//! Self-errors describe failures inside the pipeline (bad input, store
//! trouble, protocol problems). They are sent to the collector as
//! `sdk_error` events and throttled per [`ErrorRateKey`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SdkErrorCategory {
    EventValidation,
    Database,
    Init,
    Http,
    Json,
}

impl SdkErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkErrorCategory::EventValidation => "event_validation",
            SdkErrorCategory::Database => "db",
            SdkErrorCategory::Init => "init",
            SdkErrorCategory::Http => "http",
            SdkErrorCategory::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SdkErrorArea {
    BusinessEvent,
    ResourceEvent,
    ProgressionEvent,
    DesignEvent,
    ErrorEvent,
    CustomDimension,
    InitHttp,
    EventsHttp,
    ProcessEvents,
    AddEventsToStore,
}

impl SdkErrorArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkErrorArea::BusinessEvent => "business",
            SdkErrorArea::ResourceEvent => "resource",
            SdkErrorArea::ProgressionEvent => "progression",
            SdkErrorArea::DesignEvent => "design",
            SdkErrorArea::ErrorEvent => "error",
            SdkErrorArea::CustomDimension => "custom_dimension",
            SdkErrorArea::InitHttp => "init_http",
            SdkErrorArea::EventsHttp => "events_http",
            SdkErrorArea::ProcessEvents => "process_events",
            SdkErrorArea::AddEventsToStore => "add_events_to_store",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdkErrorAction {
    InvalidCurrency,
    InvalidShortString,
    InvalidEventPartLength,
    InvalidEventPartCharacters,
    InvalidFlowType,
    StringEmptyOrNull,
    NotFoundInAvailableCurrencies,
    InvalidAmount,
    NotFoundInAvailableItemTypes,
    WrongProgressionOrder,
    InvalidEventIdLength,
    InvalidEventIdCharacters,
    InvalidLongString,
    InvalidDimension,
    DatabaseTooLarge,
    DatabaseOpenOrCreate,
    JsonError,
    FailHttpJsonDecode,
    FailHttpJsonEncode,
}

impl SdkErrorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkErrorAction::InvalidCurrency => "invalid_currency",
            SdkErrorAction::InvalidShortString => "invalid_short_string",
            SdkErrorAction::InvalidEventPartLength => "invalid_event_part_length",
            SdkErrorAction::InvalidEventPartCharacters => "invalid_event_part_characters",
            SdkErrorAction::InvalidFlowType => "invalid_flow_type",
            SdkErrorAction::StringEmptyOrNull => "string_empty_or_null",
            SdkErrorAction::NotFoundInAvailableCurrencies => "not_found_in_available_currencies",
            SdkErrorAction::InvalidAmount => "invalid_amount",
            SdkErrorAction::NotFoundInAvailableItemTypes => "not_found_in_available_item_types",
            SdkErrorAction::WrongProgressionOrder => "wrong_progression_order",
            SdkErrorAction::InvalidEventIdLength => "invalid_event_id_length",
            SdkErrorAction::InvalidEventIdCharacters => "invalid_event_id_characters",
            SdkErrorAction::InvalidLongString => "invalid_long_string",
            SdkErrorAction::InvalidDimension => "invalid_dimension",
            SdkErrorAction::DatabaseTooLarge => "db_too_large",
            SdkErrorAction::DatabaseOpenOrCreate => "db_open_or_create",
            SdkErrorAction::JsonError => "json_error",
            SdkErrorAction::FailHttpJsonDecode => "fail_http_json_decode",
            SdkErrorAction::FailHttpJsonEncode => "fail_http_json_encode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdkErrorParameter {
    Currency,
    CartType,
    ItemType,
    ItemId,
    FlowType,
    Amount,
    Progression01,
    Progression02,
    Progression03,
    EventId,
    Score,
    Value,
    Message,
    Dimension,
}

impl SdkErrorParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkErrorParameter::Currency => "currency",
            SdkErrorParameter::CartType => "cart_type",
            SdkErrorParameter::ItemType => "item_type",
            SdkErrorParameter::ItemId => "item_id",
            SdkErrorParameter::FlowType => "flow_type",
            SdkErrorParameter::Amount => "amount",
            SdkErrorParameter::Progression01 => "progression01",
            SdkErrorParameter::Progression02 => "progression02",
            SdkErrorParameter::Progression03 => "progression03",
            SdkErrorParameter::EventId => "event_id",
            SdkErrorParameter::Score => "score",
            SdkErrorParameter::Value => "value",
            SdkErrorParameter::Message => "message",
            SdkErrorParameter::Dimension => "dimension",
        }
    }
}

/// Throttling key for self-errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorRateKey {
    pub category: SdkErrorCategory,
    pub area: SdkErrorArea,
}

/// Typed description of an SDK-side failure.
///
/// Returned by the validator as the rejection reason and reused as the
/// payload of self-error reports.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} / {} / {}: {reason}", .category.as_str(), .area.as_str(), .action.as_str())]
pub struct SdkError {
    pub category: SdkErrorCategory,
    pub area: SdkErrorArea,
    pub action: SdkErrorAction,
    pub parameter: Option<SdkErrorParameter>,
    pub reason: String,
}

impl SdkError {
    pub fn new(
        category: SdkErrorCategory,
        area: SdkErrorArea,
        action: SdkErrorAction,
        parameter: Option<SdkErrorParameter>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category,
            area,
            action,
            parameter,
            reason: reason.into(),
        }
    }

    pub fn rate_key(&self) -> ErrorRateKey {
        ErrorRateKey {
            category: self.category,
            area: self.area,
        }
    }
}

/// Validation failures use the same shape as self-errors
pub type Rejection = SdkError;
