//! Checklist template definition: templates, sections, items and their
//! type-specific configuration.
//!
//! A [`Template`] record is immutable once stored. Authoring changes produce
//! a new record through the version manager, linked back via
//! `previous_version_id`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checklist::condition::{ConditionRule, Operator};
use crate::types::{DbId, Timestamp, UnknownVariant};

/* --------------------------------------------------------------------------
Bilingual text
-------------------------------------------------------------------------- */

/// A label carried in the clinic's primary language with an optional
/// secondary translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl LocalizedText {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }
}

/* --------------------------------------------------------------------------
Scope and purpose
-------------------------------------------------------------------------- */

/// Who owns a template: shared by every clinic, or private to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "clinic_id", rename_all = "snake_case")]
pub enum TemplateScope {
    Global,
    Clinic(DbId),
}

impl TemplateScope {
    /// The owning clinic, or `None` for global templates.
    pub fn clinic_id(&self) -> Option<DbId> {
        match self {
            TemplateScope::Global => None,
            TemplateScope::Clinic(id) => Some(*id),
        }
    }

    pub fn from_clinic_id(clinic_id: Option<DbId>) -> Self {
        clinic_id.map_or(TemplateScope::Global, TemplateScope::Clinic)
    }
}

/// What kind of visit documentation a template captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormPurpose {
    InitialEvaluation,
    FollowUp,
    ReEvaluation,
    ProgressNote,
    Discharge,
    Custom,
}

impl FormPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormPurpose::InitialEvaluation => "initial_evaluation",
            FormPurpose::FollowUp => "follow_up",
            FormPurpose::ReEvaluation => "re_evaluation",
            FormPurpose::ProgressNote => "progress_note",
            FormPurpose::Discharge => "discharge",
            FormPurpose::Custom => "custom",
        }
    }
}

impl fmt::Display for FormPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormPurpose {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initial_evaluation" => Ok(FormPurpose::InitialEvaluation),
            "follow_up" => Ok(FormPurpose::FollowUp),
            "re_evaluation" => Ok(FormPurpose::ReEvaluation),
            "progress_note" => Ok(FormPurpose::ProgressNote),
            "discharge" => Ok(FormPurpose::Discharge),
            "custom" => Ok(FormPurpose::Custom),
            other => Err(UnknownVariant::new("form purpose", other)),
        }
    }
}

/* --------------------------------------------------------------------------
Settings
-------------------------------------------------------------------------- */

/// Lower bound for the auto-save interval.
pub const MIN_AUTO_SAVE_INTERVAL_SECS: u32 = 5;

/// Upper bound for the auto-save interval.
pub const MAX_AUTO_SAVE_INTERVAL_SECS: u32 = 3600;

/// Default auto-save interval when a template does not set one.
pub const DEFAULT_AUTO_SAVE_INTERVAL_SECS: u32 = 30;

/// Per-template behaviour switches, threaded into the controller with the
/// pinned template rather than read from global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default)]
    pub allow_skip: bool,
    #[serde(default)]
    pub require_all_sections: bool,
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_seconds: u32,
    #[serde(default = "default_true")]
    pub show_progress_bar: bool,
}

fn default_auto_save_interval() -> u32 {
    DEFAULT_AUTO_SAVE_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            allow_skip: false,
            require_all_sections: false,
            auto_save_interval_seconds: DEFAULT_AUTO_SAVE_INTERVAL_SECS,
            show_progress_bar: true,
        }
    }
}

/* --------------------------------------------------------------------------
Item configuration
-------------------------------------------------------------------------- */

/// The kind of answer an item collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Checkbox,
    Radio,
    MultiSelect,
    Text,
    Number,
    Scale,
    Date,
    Time,
    Duration,
    BodyDiagram,
    Signature,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Checkbox => "checkbox",
            ItemType::Radio => "radio",
            ItemType::MultiSelect => "multi_select",
            ItemType::Text => "text",
            ItemType::Number => "number",
            ItemType::Scale => "scale",
            ItemType::Date => "date",
            ItemType::Time => "time",
            ItemType::Duration => "duration",
            ItemType::BodyDiagram => "body_diagram",
            ItemType::Signature => "signature",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable option of a radio or multi-select item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: LocalizedText,
}

/// Literal option value used when the free-text "other" field is enabled.
pub const OTHER_OPTION_VALUE: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceConfig {
    pub options: Vec<ChoiceOption>,
    #[serde(default)]
    pub other_option: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<usize>,
}

impl ChoiceConfig {
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default)]
    pub multiline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<LocalizedText>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_scale_step")]
    pub step: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_label: Option<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_label: Option<LocalizedText>,
}

fn default_scale_step() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_minutes: Option<i64>,
}

/// Which outline a body diagram draws on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyView {
    #[default]
    Front,
    Back,
    Both,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyDiagramConfig {
    #[serde(default)]
    pub view: BodyView,
}

/// Type-specific item configuration. The variant *is* the item type, so a
/// config can never disagree with the type it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum ItemConfig {
    Checkbox,
    Radio(ChoiceConfig),
    MultiSelect(ChoiceConfig),
    Text(TextConfig),
    Number(NumberConfig),
    Scale(ScaleConfig),
    Date,
    Time,
    Duration(DurationConfig),
    BodyDiagram(BodyDiagramConfig),
    Signature,
}

impl ItemConfig {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemConfig::Checkbox => ItemType::Checkbox,
            ItemConfig::Radio(_) => ItemType::Radio,
            ItemConfig::MultiSelect(_) => ItemType::MultiSelect,
            ItemConfig::Text(_) => ItemType::Text,
            ItemConfig::Number(_) => ItemType::Number,
            ItemConfig::Scale(_) => ItemType::Scale,
            ItemConfig::Date => ItemType::Date,
            ItemConfig::Time => ItemType::Time,
            ItemConfig::Duration(_) => ItemType::Duration,
            ItemConfig::BodyDiagram(_) => ItemType::BodyDiagram,
            ItemConfig::Signature => ItemType::Signature,
        }
    }
}

/// Free-text constraints applied on top of the item config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/* --------------------------------------------------------------------------
CDS rules
-------------------------------------------------------------------------- */

/// How urgently a CDS alert should be surfaced to the clinician.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A clinical-decision-support rule attached to an item. The condition is
/// evaluated against the item's own answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdsRule {
    pub operator: Operator,
    pub value: serde_json::Value,
    pub severity: AlertSeverity,
    pub message: LocalizedText,
}

/* --------------------------------------------------------------------------
Sections, items, templates
-------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique within the template definition and stable across versions.
    pub id: DbId,
    pub label: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<LocalizedText>,
    pub config: ItemConfig,
    pub sort_order: i32,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<TextConstraints>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visibility: Vec<ConditionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cds_rules: Vec<CdsRule>,
}

impl Item {
    pub fn item_type(&self) -> ItemType {
        self.config.item_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: DbId,
    pub title: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,
    pub sort_order: i32,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visibility: Vec<ConditionRule>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Section {
    /// Items in render/evaluation order.
    pub fn ordered_items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.iter().collect();
        items.sort_by_key(|i| (i.sort_order, i.id));
        items
    }
}

/// A stored, immutable template version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: DbId,
    pub scope: TemplateScope,
    pub purpose: FormPurpose,
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,
    pub version: i32,
    pub is_current_version: bool,
    pub previous_version_id: Option<DbId>,
    pub settings: TemplateSettings,
    pub sections: Vec<Section>,
    pub created_by: DbId,
    pub created_at: Timestamp,
}

impl Template {
    /// Sections in render/evaluation order.
    pub fn ordered_sections(&self) -> Vec<&Section> {
        let mut sections: Vec<&Section> = self.sections.iter().collect();
        sections.sort_by_key(|s| (s.sort_order, s.id));
        sections
    }

    /// Every item paired with its section, in render order.
    pub fn ordered_items(&self) -> Vec<(&Section, &Item)> {
        self.ordered_sections()
            .into_iter()
            .flat_map(|s| s.ordered_items().into_iter().map(move |i| (s, i)))
            .collect()
    }

    pub fn find_item(&self, item_id: DbId) -> Option<&Item> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter())
            .find(|i| i.id == item_id)
    }

    pub fn item_ids(&self) -> Vec<DbId> {
        self.ordered_items().into_iter().map(|(_, i)| i.id).collect()
    }
}

/// Everything needed to store a new template version. The store assigns
/// `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplateVersion {
    pub scope: TemplateScope,
    pub purpose: FormPurpose,
    pub name: LocalizedText,
    pub description: Option<LocalizedText>,
    pub version: i32,
    pub previous_version_id: Option<DbId>,
    pub settings: TemplateSettings,
    pub sections: Vec<Section>,
    pub created_by: DbId,
}

impl NewTemplateVersion {
    /// Materialise the stored record once the store has assigned an id.
    pub fn into_template(self, id: DbId, created_at: Timestamp) -> Template {
        Template {
            id,
            scope: self.scope,
            purpose: self.purpose,
            name: self.name,
            description: self.description,
            version: self.version,
            is_current_version: true,
            previous_version_id: self.previous_version_id,
            settings: self.settings,
            sections: self.sections,
            created_by: self.created_by,
            created_at,
        }
    }
}
