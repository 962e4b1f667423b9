//! Row types for the checklist tables and their conversion into domain types.

use clinic_core::checklist::cds::TriggeredAlert;
use clinic_core::checklist::instance::{
    ChecklistInstance, InstanceStatus, NoteStatus, Response, ResponseHistoryEntry,
};
use clinic_core::checklist::template::{
    FormPurpose, LocalizedText, Section, Template, TemplateScope, TemplateSettings,
};
use clinic_core::checklist::value::ResponseValue;
use clinic_core::store::StoreError;
use clinic_core::types::{DbId, Timestamp, UnknownVariant};
use sqlx::types::Json;
use sqlx::FromRow;

fn unknown_variant(err: UnknownVariant) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// A row from the `checklist_templates` table.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: DbId,
    pub clinic_id: Option<DbId>,
    pub purpose: String,
    pub name: Json<LocalizedText>,
    pub description: Option<Json<LocalizedText>>,
    pub version: i32,
    pub is_current_version: bool,
    pub previous_version_id: Option<DbId>,
    pub settings: Json<TemplateSettings>,
    pub sections: Json<Vec<Section>>,
    pub created_by: DbId,
    pub created_at: Timestamp,
}

impl TryFrom<TemplateRow> for Template {
    type Error = StoreError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let purpose: FormPurpose = row
            .purpose
            .parse()
            .map_err(unknown_variant)?;
        Ok(Template {
            id: row.id,
            scope: TemplateScope::from_clinic_id(row.clinic_id),
            purpose,
            name: row.name.0,
            description: row.description.map(|d| d.0),
            version: row.version,
            is_current_version: row.is_current_version,
            previous_version_id: row.previous_version_id,
            settings: row.settings.0,
            sections: row.sections.0,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// A row from the `checklist_instances` table (responses are loaded
/// separately).
#[derive(Debug, Clone, FromRow)]
pub struct InstanceRow {
    pub id: DbId,
    pub clinic_id: DbId,
    pub template_id: DbId,
    pub template_version: i32,
    pub patient_id: DbId,
    pub session_id: Option<DbId>,
    pub created_by: DbId,
    pub status: String,
    pub progress_percentage: f64,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub reviewed_by: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<DbId>,
    pub last_auto_saved_at: Option<Timestamp>,
    pub note_status: String,
    pub generated_note: Option<String>,
    pub generated_note_secondary: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl InstanceRow {
    /// Build the domain instance from this row and its responses.
    pub fn into_instance(self, responses: Vec<Response>) -> Result<ChecklistInstance, StoreError> {
        let status: InstanceStatus = self
            .status
            .parse()
            .map_err(unknown_variant)?;
        let note_status: NoteStatus = self
            .note_status
            .parse()
            .map_err(unknown_variant)?;

        Ok(ChecklistInstance {
            id: self.id,
            clinic_id: self.clinic_id,
            template_id: self.template_id,
            template_version: self.template_version,
            patient_id: self.patient_id,
            session_id: self.session_id,
            created_by: self.created_by,
            status,
            progress_percentage: self.progress_percentage,
            started_at: self.started_at,
            completed_at: self.completed_at,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at,
            locked_at: self.locked_at,
            locked_by: self.locked_by,
            last_auto_saved_at: self.last_auto_saved_at,
            note_status,
            generated_note: self.generated_note,
            generated_note_secondary: self.generated_note_secondary,
            responses,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row from the `checklist_responses` table.
#[derive(Debug, Clone, FromRow)]
pub struct ResponseRow {
    pub item_id: DbId,
    pub value: Option<Json<ResponseValue>>,
    pub is_skipped: bool,
    pub skip_reason: Option<String>,
    pub triggered_alerts: Json<Vec<TriggeredAlert>>,
    pub response_history: Json<Vec<ResponseHistoryEntry>>,
    pub answered_by: DbId,
    pub answered_at: Timestamp,
}

impl From<ResponseRow> for Response {
    fn from(row: ResponseRow) -> Self {
        Response {
            item_id: row.item_id,
            value: row.value.map(|v| v.0),
            is_skipped: row.is_skipped,
            skip_reason: row.skip_reason,
            triggered_alerts: row.triggered_alerts.0,
            response_history: row.response_history.0,
            answered_by: row.answered_by,
            answered_at: row.answered_at,
        }
    }
}
