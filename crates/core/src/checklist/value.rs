//! Typed answer payloads.
//!
//! Each variant of [`ResponseValue`] matches one [`ItemType`]. Raw client
//! payloads are turned into these by the item validator; the condition
//! evaluator compares them through [`ResponseValue::comparable`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checklist::template::ItemType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxAnswer {
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceAnswer {
    pub selected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiChoiceAnswer {
    pub selected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnswer {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericAnswer {
    pub value: f64,
}

/// ISO `YYYY-MM-DD` for dates, `HH:MM` for times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalAnswer {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationAnswer {
    pub minutes: i64,
}

/// A mark on the body outline, in normalised image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDiagramAnswer {
    pub points: Vec<BodyPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureAnswer {
    /// Encoded signature image or vector payload.
    pub data: String,
    /// RFC 3339 timestamp captured by the signing device.
    pub signed_at: String,
}

/// A validated answer, tagged with the item type it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum ResponseValue {
    Checkbox(CheckboxAnswer),
    Radio(ChoiceAnswer),
    MultiSelect(MultiChoiceAnswer),
    Text(TextAnswer),
    Number(NumericAnswer),
    Scale(NumericAnswer),
    Date(TemporalAnswer),
    Time(TemporalAnswer),
    Duration(DurationAnswer),
    BodyDiagram(BodyDiagramAnswer),
    Signature(SignatureAnswer),
}

impl ResponseValue {
    pub fn item_type(&self) -> ItemType {
        match self {
            ResponseValue::Checkbox(_) => ItemType::Checkbox,
            ResponseValue::Radio(_) => ItemType::Radio,
            ResponseValue::MultiSelect(_) => ItemType::MultiSelect,
            ResponseValue::Text(_) => ItemType::Text,
            ResponseValue::Number(_) => ItemType::Number,
            ResponseValue::Scale(_) => ItemType::Scale,
            ResponseValue::Date(_) => ItemType::Date,
            ResponseValue::Time(_) => ItemType::Time,
            ResponseValue::Duration(_) => ItemType::Duration,
            ResponseValue::BodyDiagram(_) => ItemType::BodyDiagram,
            ResponseValue::Signature(_) => ItemType::Signature,
        }
    }

    /// Canonical JSON projection used when a condition compares this answer
    /// against a rule value.
    pub fn comparable(&self) -> Value {
        match self {
            ResponseValue::Checkbox(a) => Value::Bool(a.checked),
            ResponseValue::Radio(a) => Value::String(a.selected.clone()),
            ResponseValue::MultiSelect(a) => {
                Value::Array(a.selected.iter().cloned().map(Value::String).collect())
            }
            ResponseValue::Text(a) => Value::String(a.value.clone()),
            ResponseValue::Number(a) | ResponseValue::Scale(a) => {
                serde_json::Number::from_f64(a.value).map_or(Value::Null, Value::Number)
            }
            ResponseValue::Date(a) | ResponseValue::Time(a) => Value::String(a.value.clone()),
            ResponseValue::Duration(a) => Value::from(a.minutes),
            ResponseValue::BodyDiagram(a) => Value::Array(
                a.points
                    .iter()
                    .filter_map(|p| p.region.clone())
                    .map(Value::String)
                    .collect(),
            ),
            ResponseValue::Signature(a) => Value::Bool(!a.data.is_empty()),
        }
    }
}
