//! Custom field cleaning
//!
//! Invalid entries are dropped one by one; the event itself is kept.

use crate::types::{
    CustomFields, CustomValue, MAX_CUSTOM_FIELDS_COUNT, MAX_CUSTOM_FIELDS_VALUE_STRING_LENGTH,
};

use super::rules::is_valid_field_key;

/// Custom fields after cleaning, with the keys that were dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedFields {
    pub fields: CustomFields,
    pub dropped: Vec<String>,
}

/// Keep valid entries up to the field cap
pub fn clean_custom_fields(fields: &CustomFields) -> CleanedFields {
    let mut cleaned = CleanedFields::default();

    for (key, value) in fields.iter() {
        let valid = is_valid_field_key(key)
            && match value {
                CustomValue::Str(s) => s.chars().count() <= MAX_CUSTOM_FIELDS_VALUE_STRING_LENGTH,
                CustomValue::Float(f) => f.is_finite(),
                CustomValue::Int(_) | CustomValue::Bool(_) => true,
            };

        if valid && cleaned.fields.len() < MAX_CUSTOM_FIELDS_COUNT {
            cleaned.fields.set(key.clone(), value.clone());
        } else {
            cleaned.dropped.push(key.clone());
        }
    }

    cleaned
}
