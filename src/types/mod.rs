//! Data types shared across the pipeline
//!
//! This module contains the event model, custom fields, queued records and
//! the self-error taxonomy.

mod custom_fields;
mod event;
mod record;
mod sdk_error;

pub use custom_fields::{
    CustomFields, CustomValue, MAX_CUSTOM_FIELDS_COUNT, MAX_CUSTOM_FIELDS_KEY_LENGTH,
    MAX_CUSTOM_FIELDS_VALUE_STRING_LENGTH,
};
pub use event::{
    EncodeError, ErrorSeverity, EventCategory, FlowType, GameEvent, ProgressionStatus,
};
pub use record::{QueuedRecord, RecordStatus, StoreLimits};
pub use sdk_error::{
    ErrorRateKey, Rejection, SdkError, SdkErrorAction, SdkErrorArea, SdkErrorCategory,
    SdkErrorParameter,
};

/// Custom dimension slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionSlot {
    First,
    Second,
    Third,
}

impl DimensionSlot {
    pub fn index(&self) -> usize {
        match self {
            DimensionSlot::First => 0,
            DimensionSlot::Second => 1,
            DimensionSlot::Third => 2,
        }
    }

    /// Annotation key used on the wire
    pub fn field_name(&self) -> &'static str {
        match self {
            DimensionSlot::First => "custom_01",
            DimensionSlot::Second => "custom_02",
            DimensionSlot::Third => "custom_03",
        }
    }

    pub const ALL: [DimensionSlot; 3] = [DimensionSlot::First, DimensionSlot::Second, DimensionSlot::Third];
}
