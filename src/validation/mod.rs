//! Event validation
//!
//! Stateless rule checks run on the caller's thread before anything is
//! queued. A failed check yields a typed [`Rejection`](crate::types::Rejection)
//! that is logged and reported as a rate-limited self-error.

mod events;
mod fields;
mod rules;

pub use events::{
    check_progression_order, validate_custom_dimension, validate_event, EventRules,
    ProgressionOrderPolicy,
};
pub use fields::{clean_custom_fields, CleanedFields};
pub use rules::{
    check_event_id, check_event_part, is_valid_currency, is_valid_short_string, PartCheck,
    MAX_EVENT_PART_LENGTH, MAX_LONG_STRING_LENGTH, MAX_SHORT_STRING_LENGTH,
};
