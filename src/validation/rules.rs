//! Primitive string checks shared by the event validators

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of a short string (cart type, custom dimension)
pub const MAX_SHORT_STRING_LENGTH: usize = 32;
/// Maximum length of a long string (error message)
pub const MAX_LONG_STRING_LENGTH: usize = 8192;
/// Maximum length of one event id part
pub const MAX_EVENT_PART_LENGTH: usize = 64;
/// Maximum number of `:`-separated parts in a design event id
pub const MAX_EVENT_ID_PARTS: usize = 5;

static EVENT_PART_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\s\-_\.\(\)!\?]{1,64}$").unwrap());

static CURRENCY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

static FIELD_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,64}$").unwrap());

/// Outcome of an event part check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartCheck {
    Ok,
    BadLength,
    BadCharacters,
}

/// Check one `event_id` segment
pub fn check_event_part(part: &str) -> PartCheck {
    let len = part.chars().count();
    if len == 0 || len > MAX_EVENT_PART_LENGTH {
        PartCheck::BadLength
    } else if !EVENT_PART_REGEX.is_match(part) {
        PartCheck::BadCharacters
    } else {
        PartCheck::Ok
    }
}

/// Check a full design event id (1 to 5 parts)
pub fn check_event_id(event_id: &str) -> PartCheck {
    let parts: Vec<&str> = event_id.split(':').collect();
    if parts.len() > MAX_EVENT_ID_PARTS {
        return PartCheck::BadLength;
    }
    parts
        .iter()
        .map(|p| check_event_part(p))
        .find(|c| *c != PartCheck::Ok)
        .unwrap_or(PartCheck::Ok)
}

pub fn is_valid_currency(currency: &str) -> bool {
    CURRENCY_REGEX.is_match(currency)
}

/// Short strings may be empty
pub fn is_valid_short_string(value: &str) -> bool {
    value.chars().count() <= MAX_SHORT_STRING_LENGTH
}

/// Long strings may be empty
pub fn is_valid_long_string(value: &str) -> bool {
    value.chars().count() <= MAX_LONG_STRING_LENGTH
}

pub fn is_valid_field_key(key: &str) -> bool {
    FIELD_KEY_REGEX.is_match(key)
}

/// Empty allow-list means "anything goes"
pub fn is_allowed(value: &str, allow_list: &[String]) -> bool {
    allow_list.is_empty() || allow_list.iter().any(|v| v == value)
}
