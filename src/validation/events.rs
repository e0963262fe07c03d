//! Per-kind event validation
//!
//! Every check is pure: it reads the event and the configured allow-lists
//! and returns the first rule that failed. Nothing here mutates state.

use crate::types::{
    DimensionSlot, GameEvent, ProgressionStatus, Rejection, SdkError, SdkErrorAction,
    SdkErrorArea, SdkErrorCategory, SdkErrorParameter,
};

use super::rules::{
    check_event_id, check_event_part, is_allowed, is_valid_currency, is_valid_long_string,
    is_valid_short_string, PartCheck,
};

/// Allow-lists configured by the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRules {
    pub available_currencies: Vec<String>,
    pub available_item_types: Vec<String>,
    pub available_dimensions: [Vec<String>; 3],
}

impl EventRules {
    pub fn dimensions(&self, slot: DimensionSlot) -> &[String] {
        &self.available_dimensions[slot.index()]
    }
}

/// What to do with a `Fail`/`Complete` that had no matching `Start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressionOrderPolicy {
    /// Report a self-error but keep the event
    #[default]
    Report,
    /// Report a self-error and drop the event
    Reject,
}

fn rejection(
    area: SdkErrorArea,
    action: SdkErrorAction,
    parameter: SdkErrorParameter,
    reason: String,
) -> Rejection {
    SdkError::new(
        SdkErrorCategory::EventValidation,
        area,
        action,
        Some(parameter),
        reason,
    )
}

fn event_part(
    area: SdkErrorArea,
    parameter: SdkErrorParameter,
    value: &str,
) -> Result<(), Rejection> {
    match check_event_part(value) {
        PartCheck::Ok => Ok(()),
        PartCheck::BadLength => Err(rejection(
            area,
            SdkErrorAction::InvalidEventPartLength,
            parameter,
            format!("{} must be 1-64 characters, got '{}'", parameter.as_str(), value),
        )),
        PartCheck::BadCharacters => Err(rejection(
            area,
            SdkErrorAction::InvalidEventPartCharacters,
            parameter,
            format!("{} contains invalid characters: '{}'", parameter.as_str(), value),
        )),
    }
}

/// Validate an event against the rules
pub fn validate_event(event: &GameEvent, rules: &EventRules) -> Result<(), Rejection> {
    let area = event.sdk_error_area();

    match event {
        GameEvent::Business {
            currency,
            item_type,
            item_id,
            cart_type,
            ..
        } => {
            if !is_valid_currency(currency) {
                return Err(rejection(
                    area,
                    SdkErrorAction::InvalidCurrency,
                    SdkErrorParameter::Currency,
                    format!("currency must be 3 upper-case letters, got '{}'", currency),
                ));
            }
            if let Some(cart) = cart_type {
                if !is_valid_short_string(cart) {
                    return Err(rejection(
                        area,
                        SdkErrorAction::InvalidShortString,
                        SdkErrorParameter::CartType,
                        format!("cart type longer than 32 characters: '{}'", cart),
                    ));
                }
            }
            event_part(area, SdkErrorParameter::ItemType, item_type)?;
            event_part(area, SdkErrorParameter::ItemId, item_id)
        }

        GameEvent::Resource {
            currency,
            amount,
            item_type,
            item_id,
            ..
        } => {
            if currency.is_empty() {
                return Err(rejection(
                    area,
                    SdkErrorAction::StringEmptyOrNull,
                    SdkErrorParameter::Currency,
                    "resource currency cannot be empty".to_string(),
                ));
            }
            if !is_allowed(currency, &rules.available_currencies) {
                return Err(rejection(
                    area,
                    SdkErrorAction::NotFoundInAvailableCurrencies,
                    SdkErrorParameter::Currency,
                    format!("currency '{}' is not in the configured currencies", currency),
                ));
            }
            if !amount.is_finite() || *amount <= 0.0 {
                return Err(rejection(
                    area,
                    SdkErrorAction::InvalidAmount,
                    SdkErrorParameter::Amount,
                    format!("amount must be a positive number, got {}", amount),
                ));
            }
            event_part(area, SdkErrorParameter::ItemType, item_type)?;
            if !is_allowed(item_type, &rules.available_item_types) {
                return Err(rejection(
                    area,
                    SdkErrorAction::NotFoundInAvailableItemTypes,
                    SdkErrorParameter::ItemType,
                    format!("item type '{}' is not in the configured item types", item_type),
                ));
            }
            event_part(area, SdkErrorParameter::ItemId, item_id)
        }

        GameEvent::Progression {
            progression01,
            progression02,
            progression03,
            score,
            ..
        } => {
            event_part(area, SdkErrorParameter::Progression01, progression01)?;
            if progression03.is_some() && progression02.is_none() {
                return Err(rejection(
                    area,
                    SdkErrorAction::StringEmptyOrNull,
                    SdkErrorParameter::Progression02,
                    "progression02 is required when progression03 is set".to_string(),
                ));
            }
            if let Some(p2) = progression02 {
                event_part(area, SdkErrorParameter::Progression02, p2)?;
            }
            if let Some(p3) = progression03 {
                event_part(area, SdkErrorParameter::Progression03, p3)?;
            }
            match score {
                Some(s) if !s.is_finite() => Err(rejection(
                    area,
                    SdkErrorAction::InvalidAmount,
                    SdkErrorParameter::Score,
                    format!("score must be finite, got {}", s),
                )),
                _ => Ok(()),
            }
        }

        GameEvent::Design { event_id, value } => {
            match check_event_id(event_id) {
                PartCheck::Ok => {}
                PartCheck::BadLength => {
                    return Err(rejection(
                        area,
                        SdkErrorAction::InvalidEventIdLength,
                        SdkErrorParameter::EventId,
                        format!("event id needs 1-5 parts of 1-64 characters: '{}'", event_id),
                    ))
                }
                PartCheck::BadCharacters => {
                    return Err(rejection(
                        area,
                        SdkErrorAction::InvalidEventIdCharacters,
                        SdkErrorParameter::EventId,
                        format!("event id contains invalid characters: '{}'", event_id),
                    ))
                }
            }
            match value {
                Some(v) if !v.is_finite() => Err(rejection(
                    area,
                    SdkErrorAction::InvalidAmount,
                    SdkErrorParameter::Value,
                    format!("design value must be finite, got {}", v),
                )),
                _ => Ok(()),
            }
        }

        GameEvent::Error { message, .. } => {
            if is_valid_long_string(message) {
                Ok(())
            } else {
                Err(rejection(
                    area,
                    SdkErrorAction::InvalidLongString,
                    SdkErrorParameter::Message,
                    format!("message is longer than {} characters", super::rules::MAX_LONG_STRING_LENGTH),
                ))
            }
        }
    }
}

/// Validate a custom dimension value; `None` clears the slot
pub fn validate_custom_dimension(
    slot: DimensionSlot,
    value: Option<&str>,
    rules: &EventRules,
) -> Result<(), Rejection> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    if !is_valid_short_string(value) || !is_allowed(value, rules.dimensions(slot)) {
        return Err(rejection(
            SdkErrorArea::CustomDimension,
            SdkErrorAction::InvalidDimension,
            SdkErrorParameter::Dimension,
            format!("{} value '{}' is not allowed", slot.field_name(), value),
        ));
    }
    Ok(())
}

/// Check that a progression path was started before it is failed or completed
pub fn check_progression_order(
    status: ProgressionStatus,
    path: &str,
    started: bool,
) -> Result<(), Rejection> {
    if status == ProgressionStatus::Start || started {
        return Ok(());
    }
    Err(rejection(
        SdkErrorArea::ProgressionEvent,
        SdkErrorAction::WrongProgressionOrder,
        SdkErrorParameter::Progression01,
        format!("{} on '{}' without a prior Start", status.as_str(), path),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorSeverity, FlowType};

    fn resource(currency: &str, amount: f64, item_type: &str) -> GameEvent {
        GameEvent::Resource {
            flow_type: FlowType::Sink,
            currency: currency.to_string(),
            amount,
            item_type: item_type.to_string(),
            item_id: "potion".to_string(),
        }
    }

    #[test]
    fn test_business_currency_must_be_iso_like() {
        let event = GameEvent::Business {
            currency: "dollars".to_string(),
            amount: 100,
            item_type: "weapon".to_string(),
            item_id: "sword".to_string(),
            cart_type: None,
        };

        let err = validate_event(&event, &EventRules::default()).unwrap_err();
        assert_eq!(err.action, SdkErrorAction::InvalidCurrency);
        assert_eq!(err.area, SdkErrorArea::BusinessEvent);
    }

    #[test]
    fn test_resource_allow_lists() {
        let rules = EventRules {
            available_currencies: vec!["gems".to_string()],
            available_item_types: vec!["boost".to_string()],
            ..Default::default()
        };

        assert!(validate_event(&resource("gems", 10.0, "boost"), &rules).is_ok());

        let err = validate_event(&resource("gold", 10.0, "boost"), &rules).unwrap_err();
        assert_eq!(err.action, SdkErrorAction::NotFoundInAvailableCurrencies);

        let err = validate_event(&resource("gems", 10.0, "weapon"), &rules).unwrap_err();
        assert_eq!(err.action, SdkErrorAction::NotFoundInAvailableItemTypes);
    }

    #[test]
    fn test_resource_amount_must_be_positive() {
        let rules = EventRules::default();
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = validate_event(&resource("gems", amount, "boost"), &rules).unwrap_err();
            assert_eq!(err.action, SdkErrorAction::InvalidAmount);
        }
    }

    #[test]
    fn test_progression03_requires_progression02() {
        let event = GameEvent::Progression {
            status: ProgressionStatus::Start,
            progression01: "world1".to_string(),
            progression02: None,
            progression03: Some("stage".to_string()),
            score: None,
        };

        let err = validate_event(&event, &EventRules::default()).unwrap_err();
        assert_eq!(err.parameter, Some(SdkErrorParameter::Progression02));
    }

    #[test]
    fn test_design_event_id_characters() {
        let event = GameEvent::Design {
            event_id: "kill:boss#1".to_string(),
            value: None,
        };

        let err = validate_event(&event, &EventRules::default()).unwrap_err();
        assert_eq!(err.action, SdkErrorAction::InvalidEventIdCharacters);
    }

    #[test]
    fn test_error_message_length() {
        let ok = GameEvent::Error {
            severity: ErrorSeverity::Warning,
            message: String::new(),
        };
        assert!(validate_event(&ok, &EventRules::default()).is_ok());

        let long = GameEvent::Error {
            severity: ErrorSeverity::Critical,
            message: "x".repeat(8193),
        };
        let err = validate_event(&long, &EventRules::default()).unwrap_err();
        assert_eq!(err.action, SdkErrorAction::InvalidLongString);
    }

    #[test]
    fn test_custom_dimension_allow_list() {
        let mut rules = EventRules::default();
        rules.available_dimensions[0] = vec!["ninja".to_string(), "samurai".to_string()];

        assert!(validate_custom_dimension(DimensionSlot::First, Some("ninja"), &rules).is_ok());
        assert!(validate_custom_dimension(DimensionSlot::First, None, &rules).is_ok());
        assert!(validate_custom_dimension(DimensionSlot::First, Some("pirate"), &rules).is_err());
        // Second slot has no allow-list
        assert!(validate_custom_dimension(DimensionSlot::Second, Some("pirate"), &rules).is_ok());
    }

    #[test]
    fn test_progression_order() {
        assert!(check_progression_order(ProgressionStatus::Start, "w1", false).is_ok());
        assert!(check_progression_order(ProgressionStatus::Fail, "w1", true).is_ok());

        let err = check_progression_order(ProgressionStatus::Complete, "w1", false).unwrap_err();
        assert_eq!(err.action, SdkErrorAction::WrongProgressionOrder);
    }
}
