//! Item validator. Turns a raw answer payload into a typed
//! [`ResponseValue`], checking it against the item's configuration.
//!
//! Dispatch is purely on the item type. Requiredness is not checked here:
//! a required item may legitimately stay unanswered while it is hidden, so
//! that decision belongs to the controller.

use chrono::{DateTime, NaiveDate, NaiveTime};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checklist::template::{
    ChoiceConfig, Item, ItemConfig, NumberConfig, ScaleConfig, TextConstraints,
    OTHER_OPTION_VALUE,
};
use crate::checklist::value::{
    BodyDiagramAnswer, CheckboxAnswer, ChoiceAnswer, DurationAnswer, MultiChoiceAnswer,
    NumericAnswer, ResponseValue, SignatureAnswer, TemporalAnswer, TextAnswer,
};
use crate::types::DbId;

/// Tolerance when checking that a scale value lands on a step.
const STEP_EPSILON: f64 = 1e-9;

/// A rejected answer. Carries no state; the caller decides what to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Item {item_id}: {reason}")]
pub struct ValidationError {
    pub item_id: DbId,
    pub reason: String,
}

impl ValidationError {
    pub fn new(item_id: DbId, reason: impl Into<String>) -> Self {
        Self {
            item_id,
            reason: reason.into(),
        }
    }
}

type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a raw payload for `item` and return the typed value.
pub fn validate_answer(item: &Item, raw: &Value) -> ValidationResult<ResponseValue> {
    let id = item.id;
    match &item.config {
        ItemConfig::Checkbox => {
            let answer: CheckboxAnswer = parse(id, raw, "{\"checked\": boolean}")?;
            Ok(ResponseValue::Checkbox(answer))
        }
        ItemConfig::Radio(config) => {
            let answer: ChoiceAnswer = parse(id, raw, "{\"selected\": string}")?;
            validate_choice(id, config, &answer.selected, answer.other_text.as_deref())?;
            Ok(ResponseValue::Radio(answer))
        }
        ItemConfig::MultiSelect(config) => {
            let answer: MultiChoiceAnswer = parse(id, raw, "{\"selected\": [string]}")?;
            validate_multi_choice(id, config, &answer)?;
            Ok(ResponseValue::MultiSelect(answer))
        }
        ItemConfig::Text(_) => {
            let answer: TextAnswer = parse(id, raw, "{\"value\": string}")?;
            if let Some(constraints) = &item.validation {
                validate_text(id, constraints, &answer.value)?;
            }
            Ok(ResponseValue::Text(answer))
        }
        ItemConfig::Number(config) => {
            let answer: NumericAnswer = parse(id, raw, "{\"value\": number}")?;
            validate_number(id, config, answer.value)?;
            Ok(ResponseValue::Number(answer))
        }
        ItemConfig::Scale(config) => {
            let answer: NumericAnswer = parse(id, raw, "{\"value\": number}")?;
            validate_scale(id, config, answer.value)?;
            Ok(ResponseValue::Scale(answer))
        }
        ItemConfig::Date => {
            let answer: TemporalAnswer = parse(id, raw, "{\"value\": \"YYYY-MM-DD\"}")?;
            NaiveDate::parse_from_str(&answer.value, "%Y-%m-%d").map_err(|_| {
                ValidationError::new(id, format!("'{}' is not an ISO date (YYYY-MM-DD)", answer.value))
            })?;
            Ok(ResponseValue::Date(answer))
        }
        ItemConfig::Time => {
            let answer: TemporalAnswer = parse(id, raw, "{\"value\": \"HH:MM\"}")?;
            validate_time(id, &answer.value)?;
            Ok(ResponseValue::Time(answer))
        }
        ItemConfig::Duration(config) => {
            let answer: DurationAnswer = parse(id, raw, "{\"minutes\": integer}")?;
            if answer.minutes < 0 {
                return Err(ValidationError::new(id, "Duration must not be negative"));
            }
            if let Some(max) = config.max_minutes {
                if answer.minutes > max {
                    return Err(ValidationError::new(
                        id,
                        format!("Duration {} exceeds maximum of {max} minutes", answer.minutes),
                    ));
                }
            }
            Ok(ResponseValue::Duration(answer))
        }
        ItemConfig::BodyDiagram(_) => {
            let answer: BodyDiagramAnswer = parse(id, raw, "{\"points\": [{x, y}]}")?;
            validate_body_diagram(id, &answer)?;
            Ok(ResponseValue::BodyDiagram(answer))
        }
        ItemConfig::Signature => {
            let answer: SignatureAnswer =
                parse(id, raw, "{\"data\": string, \"signed_at\": timestamp}")?;
            validate_signature(id, &answer)?;
            Ok(ResponseValue::Signature(answer))
        }
    }
}

/// Re-check an already typed value, e.g. when counting progress.
pub fn is_valid_value(item: &Item, value: &ResponseValue) -> bool {
    if value.item_type() != item.item_type() {
        return false;
    }
    match serde_json::to_value(value) {
        Ok(raw) => validate_answer(item, &raw).is_ok(),
        Err(_) => false,
    }
}

fn parse<T: DeserializeOwned>(item_id: DbId, raw: &Value, shape: &str) -> ValidationResult<T> {
    T::deserialize(raw)
        .map_err(|e| ValidationError::new(item_id, format!("Expected {shape}: {e}")))
}

fn validate_choice(
    item_id: DbId,
    config: &ChoiceConfig,
    selected: &str,
    other_text: Option<&str>,
) -> ValidationResult<()> {
    if config.has_option(selected) {
        return Ok(());
    }
    if config.other_option && selected == OTHER_OPTION_VALUE {
        return match other_text.map(str::trim) {
            Some(text) if !text.is_empty() => Ok(()),
            _ => Err(ValidationError::new(
                item_id,
                "Selecting 'other' requires a non-empty other_text",
            )),
        };
    }
    Err(ValidationError::new(
        item_id,
        format!("'{selected}' is not one of the configured options"),
    ))
}

fn validate_multi_choice(
    item_id: DbId,
    config: &ChoiceConfig,
    answer: &MultiChoiceAnswer,
) -> ValidationResult<()> {
    for (index, selected) in answer.selected.iter().enumerate() {
        if answer.selected[..index].contains(selected) {
            return Err(ValidationError::new(
                item_id,
                format!("'{selected}' is selected more than once"),
            ));
        }
        validate_choice(item_id, config, selected, answer.other_text.as_deref())?;
    }

    let count = answer.selected.len();
    if let Some(min) = config.min_selections {
        if count < min {
            return Err(ValidationError::new(
                item_id,
                format!("At least {min} selection(s) required, got {count}"),
            ));
        }
    }
    if let Some(max) = config.max_selections {
        if count > max {
            return Err(ValidationError::new(
                item_id,
                format!("At most {max} selection(s) allowed, got {count}"),
            ));
        }
    }
    Ok(())
}

fn validate_text(item_id: DbId, constraints: &TextConstraints, value: &str) -> ValidationResult<()> {
    let length = value.chars().count();
    if let Some(min) = constraints.min_length {
        if length < min {
            return Err(ValidationError::new(
                item_id,
                format!("Text must be at least {min} characters"),
            ));
        }
    }
    if let Some(max) = constraints.max_length {
        if length > max {
            return Err(ValidationError::new(
                item_id,
                format!("Text must be at most {max} characters"),
            ));
        }
    }
    if let Some(pattern) = &constraints.pattern {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(value) => {}
            Ok(_) => {
                return Err(ValidationError::new(
                    item_id,
                    format!("Text does not match pattern '{pattern}'"),
                ))
            }
            // Patterns are checked when the template is authored.
            Err(e) => tracing::warn!(item_id, error = %e, "Ignoring invalid text pattern"),
        }
    }
    Ok(())
}

fn check_bounds(item_id: DbId, value: f64, min: Option<f64>, max: Option<f64>) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::new(item_id, "Value must be a finite number"));
    }
    if let Some(min) = min {
        if value < min {
            return Err(ValidationError::new(
                item_id,
                format!("Value {value} is below minimum {min}"),
            ));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(ValidationError::new(
                item_id,
                format!("Value {value} is above maximum {max}"),
            ));
        }
    }
    Ok(())
}

fn validate_number(item_id: DbId, config: &NumberConfig, value: f64) -> ValidationResult<()> {
    check_bounds(item_id, value, config.min, config.max)
}

fn validate_scale(item_id: DbId, config: &ScaleConfig, value: f64) -> ValidationResult<()> {
    check_bounds(item_id, value, Some(config.min), Some(config.max))?;
    if config.step > 0.0 {
        let steps = (value - config.min) / config.step;
        if (steps - steps.round()).abs() > STEP_EPSILON {
            return Err(ValidationError::new(
                item_id,
                format!(
                    "Value {value} is not on a step of {} from {}",
                    config.step, config.min
                ),
            ));
        }
    }
    Ok(())
}

fn validate_time(item_id: DbId, value: &str) -> ValidationResult<()> {
    let well_formed = value.len() == 5
        && value.as_bytes()[2] == b':'
        && NaiveTime::parse_from_str(value, "%H:%M").is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new(
            item_id,
            format!("'{value}' is not a time of the form HH:MM"),
        ))
    }
}

fn validate_body_diagram(item_id: DbId, answer: &BodyDiagramAnswer) -> ValidationResult<()> {
    if answer.points.is_empty() {
        return Err(ValidationError::new(item_id, "Body diagram needs at least one point"));
    }
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);
    for (index, point) in answer.points.iter().enumerate() {
        if !in_unit(point.x) || !in_unit(point.y) {
            return Err(ValidationError::new(
                item_id,
                format!("Point {index} must have x and y within [0, 1]"),
            ));
        }
    }
    Ok(())
}

fn validate_signature(item_id: DbId, answer: &SignatureAnswer) -> ValidationResult<()> {
    if answer.data.trim().is_empty() {
        return Err(ValidationError::new(item_id, "Signature payload is empty"));
    }
    DateTime::parse_from_rfc3339(&answer.signed_at).map_err(|_| {
        ValidationError::new(
            item_id,
            format!("'{}' is not an RFC 3339 timestamp", answer.signed_at),
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::template::fixtures::{item, vas_scale, yes_no};
    use crate::checklist::template::{
        BodyDiagramConfig, ChoiceOption, DurationConfig, LocalizedText, TextConfig,
    };
    use serde_json::json;

    fn multi(other_option: bool, min: Option<usize>, max: Option<usize>) -> ItemConfig {
        ItemConfig::MultiSelect(ChoiceConfig {
            options: ["numbness", "tingling", "weakness"]
                .iter()
                .map(|v| ChoiceOption {
                    value: v.to_string(),
                    label: LocalizedText::new(*v),
                })
                .collect(),
            other_option,
            min_selections: min,
            max_selections: max,
        })
    }

    #[test]
    fn checkbox_requires_boolean() {
        let it = item(1, ItemConfig::Checkbox, false);
        assert!(validate_answer(&it, &json!({"checked": true})).is_ok());
        let err = validate_answer(&it, &json!({"checked": "yes"})).unwrap_err();
        assert_eq!(err.item_id, 1);
    }

    #[test]
    fn radio_accepts_configured_options_only() {
        let it = item(2, yes_no(), true);
        assert!(validate_answer(&it, &json!({"selected": "yes"})).is_ok());
        assert!(validate_answer(&it, &json!({"selected": "maybe"})).is_err());
        // "other" is not special unless enabled.
        assert!(validate_answer(&it, &json!({"selected": "other", "other_text": "x"})).is_err());
    }

    #[test]
    fn other_option_needs_text() {
        let it = item(3, multi(true, None, None), false);
        assert!(validate_answer(&it, &json!({"selected": ["other"], "other_text": "burning"})).is_ok());
        assert!(validate_answer(&it, &json!({"selected": ["other"], "other_text": "  "})).is_err());
        assert!(validate_answer(&it, &json!({"selected": ["other"]})).is_err());
    }

    #[test]
    fn multi_select_checks_members_counts_and_duplicates() {
        let it = item(4, multi(false, Some(1), Some(2)), false);
        assert!(validate_answer(&it, &json!({"selected": ["numbness"]})).is_ok());
        assert!(validate_answer(&it, &json!({"selected": []})).is_err());
        assert!(validate_answer(&it, &json!({"selected": ["numbness", "tingling", "weakness"]})).is_err());
        assert!(validate_answer(&it, &json!({"selected": ["numbness", "numbness"]})).is_err());
        assert!(validate_answer(&it, &json!({"selected": ["cramping"]})).is_err());
    }

    #[test]
    fn number_respects_bounds() {
        let it = item(
            5,
            ItemConfig::Number(NumberConfig {
                min: Some(30.0),
                max: Some(45.0),
                unit: Some("°C".into()),
            }),
            false,
        );
        assert!(validate_answer(&it, &json!({"value": 36.6})).is_ok());
        assert!(validate_answer(&it, &json!({"value": 29})).is_err());
        assert!(validate_answer(&it, &json!({"value": 46})).is_err());
        assert!(validate_answer(&it, &json!({"value": "36"})).is_err());
    }

    #[test]
    fn scale_values_must_land_on_a_step() {
        let it = item(6, vas_scale(), true);
        assert!(validate_answer(&it, &json!({"value": 0})).is_ok());
        assert!(validate_answer(&it, &json!({"value": 8})).is_ok());
        assert!(validate_answer(&it, &json!({"value": 7.5})).is_err());
        assert!(validate_answer(&it, &json!({"value": 11})).is_err());

        let half_steps = item(
            7,
            ItemConfig::Scale(ScaleConfig {
                min: 1.0,
                max: 5.0,
                step: 0.5,
                min_label: None,
                max_label: None,
            }),
            false,
        );
        assert!(validate_answer(&half_steps, &json!({"value": 2.5})).is_ok());
        assert!(validate_answer(&half_steps, &json!({"value": 2.25})).is_err());
    }

    #[test]
    fn text_length_and_pattern() {
        let mut it = item(8, ItemConfig::Text(TextConfig::default()), false);
        it.validation = Some(TextConstraints {
            pattern: Some("^[A-Z]\\d{2}(\\.\\d+)?$".into()),
            min_length: Some(3),
            max_length: Some(8),
        });
        assert!(validate_answer(&it, &json!({"value": "M54.5"})).is_ok());
        assert!(validate_answer(&it, &json!({"value": "M5"})).is_err());
        assert!(validate_answer(&it, &json!({"value": "m54.5"})).is_err());
        assert!(validate_answer(&it, &json!({"value": "M54.123456"})).is_err());
    }

    #[test]
    fn text_length_counts_characters_not_bytes() {
        let mut it = item(9, ItemConfig::Text(TextConfig::default()), false);
        it.validation = Some(TextConstraints {
            pattern: None,
            min_length: None,
            max_length: Some(5),
        });
        assert!(validate_answer(&it, &json!({"value": "dolór"})).is_ok());
    }

    #[test]
    fn date_and_time_shapes() {
        let date = item(10, ItemConfig::Date, false);
        assert!(validate_answer(&date, &json!({"value": "2024-02-29"})).is_ok());
        assert!(validate_answer(&date, &json!({"value": "2023-02-29"})).is_err());
        assert!(validate_answer(&date, &json!({"value": "29/02/2024"})).is_err());

        let time = item(11, ItemConfig::Time, false);
        assert!(validate_answer(&time, &json!({"value": "09:30"})).is_ok());
        assert!(validate_answer(&time, &json!({"value": "9:30"})).is_err());
        assert!(validate_answer(&time, &json!({"value": "24:00"})).is_err());
        assert!(validate_answer(&time, &json!({"value": "09:30:00"})).is_err());
    }

    #[test]
    fn duration_is_non_negative_integer_minutes() {
        let it = item(12, ItemConfig::Duration(DurationConfig { max_minutes: Some(240) }), false);
        assert!(validate_answer(&it, &json!({"minutes": 45})).is_ok());
        assert!(validate_answer(&it, &json!({"minutes": -1})).is_err());
        assert!(validate_answer(&it, &json!({"minutes": 12.5})).is_err());
        assert!(validate_answer(&it, &json!({"minutes": 300})).is_err());
    }

    #[test]
    fn body_diagram_points_are_normalised() {
        let it = item(13, ItemConfig::BodyDiagram(BodyDiagramConfig::default()), false);
        assert!(validate_answer(&it, &json!({"points": [{"x": 0.4, "y": 0.9, "region": "lumbar"}]})).is_ok());
        assert!(validate_answer(&it, &json!({"points": []})).is_err());
        assert!(validate_answer(&it, &json!({"points": [{"x": 1.2, "y": 0.5}]})).is_err());
    }

    #[test]
    fn signature_needs_payload_and_timestamp() {
        let it = item(14, ItemConfig::Signature, false);
        assert!(validate_answer(
            &it,
            &json!({"data": "data:image/png;base64,AAAA", "signed_at": "2024-05-01T10:15:00Z"})
        )
        .is_ok());
        assert!(validate_answer(&it, &json!({"data": "", "signed_at": "2024-05-01T10:15:00Z"})).is_err());
        assert!(validate_answer(&it, &json!({"data": "abc", "signed_at": "yesterday"})).is_err());
    }

    #[test]
    fn is_valid_value_rejects_type_mismatch() {
        let it = item(15, vas_scale(), true);
        assert!(is_valid_value(&it, &ResponseValue::Scale(NumericAnswer { value: 3.0 })));
        assert!(!is_valid_value(&it, &ResponseValue::Number(NumericAnswer { value: 3.0 })));
        assert!(!is_valid_value(&it, &ResponseValue::Scale(NumericAnswer { value: 30.0 })));
    }
}
