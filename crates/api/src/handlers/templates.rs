//! Handlers for checklist template authoring and version history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clinic_core::checklist::template::{
    FormPurpose, LocalizedText, Section, Template, TemplateScope, TemplateSettings,
};
use clinic_core::checklist::versioning::{NewTemplate, TemplateRevision};
use clinic_core::types::DbId;
use clinic_events::ClinicEvent;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    /// Owning clinic; omit for a global template.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub clinic_id: Option<DbId>,
    pub purpose: FormPurpose,
    #[validate(custom(function = "non_blank"))]
    pub name: LocalizedText,
    #[serde(default)]
    pub description: Option<LocalizedText>,
    #[serde(default)]
    pub settings: TemplateSettings,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[validate(range(min = 1))]
    pub created_by: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVersionRequest {
    #[serde(flatten)]
    pub revision: TemplateRevision,
    #[validate(range(min = 1))]
    pub created_by: DbId,
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<i32>,
}

fn non_blank(text: &LocalizedText) -> Result<(), validator::ValidationError> {
    if text.primary.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

fn versioned_event(template: &Template, event_type: &str, actor: DbId) -> ClinicEvent {
    let event = ClinicEvent::new(event_type)
        .about("checklist_template", template.id)
        .by(actor)
        .with_payload(serde_json::json!({
            "purpose": template.purpose.as_str(),
            "version": template.version,
            "previous_version_id": template.previous_version_id,
        }));
    match template.scope {
        TemplateScope::Clinic(clinic_id) => event.in_clinic(clinic_id),
        TemplateScope::Global => event,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/checklist-templates
pub async fn create_template(
    State(state): State<AppState>,
    Json(input): Json<CreateTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let actor = input.created_by;
    let created = state
        .templates
        .create_template(
            NewTemplate {
                scope: TemplateScope::from_clinic_id(input.clinic_id),
                purpose: input.purpose,
                name: input.name,
                description: input.description,
                settings: input.settings,
                sections: input.sections,
            },
            actor,
        )
        .await?;

    state
        .event_bus
        .publish(versioned_event(&created, "checklist.template.created", actor));
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/checklist-templates/{id}?version=
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<VersionQuery>,
) -> AppResult<impl IntoResponse> {
    let template = state.templates.load(id, query.version).await?;
    Ok(Json(DataResponse { data: template }))
}

/// GET /api/v1/checklist-templates/{id}/history
pub async fn version_history(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let chain = state.templates.version_history(id).await?;
    Ok(Json(DataResponse { data: chain }))
}

/// POST /api/v1/checklist-templates/{id}/versions
pub async fn create_version(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateVersionRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let actor = input.created_by;
    let created = state
        .templates
        .create_version(id, input.revision, actor)
        .await?;

    state
        .event_bus
        .publish(versioned_event(&created, "checklist.template.versioned", actor));
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}
