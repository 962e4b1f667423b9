//! Handlers for checklist instances: creation, answers, auto-save, status
//! transitions, locking and the note-generation callback.
//!
//! Authentication is handled upstream; the acting user arrives in the body.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clinic_core::checklist::controller::{AnswerSubmission, CreateInstance};
use clinic_core::checklist::instance::{InstanceStatus, NoteStatus};
use clinic_core::store::GeneratedNote;
use clinic_core::types::DbId;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChecklistRequest {
    #[validate(range(min = 1))]
    pub clinic_id: DbId,
    #[validate(range(min = 1))]
    pub template_id: DbId,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub template_version: Option<i32>,
    #[validate(range(min = 1))]
    pub patient_id: DbId,
    #[serde(default)]
    pub session_id: Option<DbId>,
    #[validate(range(min = 1))]
    pub created_by: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub skip_reason: Option<String>,
    #[validate(range(min = 1))]
    pub answered_by: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AutoSaveRequest {
    #[validate(length(max = 500))]
    pub entries: Vec<AnswerSubmission>,
    #[validate(range(min = 1))]
    pub answered_by: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    pub status: InstanceStatus,
    #[validate(range(min = 1))]
    pub actor_id: DbId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LockRequest {
    #[validate(range(min = 1))]
    pub actor_id: DbId,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedNoteRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_secondary: Option<String>,
    pub status: NoteStatus,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/checklists
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateChecklistRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let instance = state
        .controller
        .create_instance(
            CreateInstance {
                clinic_id: input.clinic_id,
                template_id: input.template_id,
                template_version: input.template_version,
                patient_id: input.patient_id,
                session_id: input.session_id,
            },
            input.created_by,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: instance })))
}

/// GET /api/v1/checklists/{id}
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.controller.snapshot(id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// PUT /api/v1/checklists/{id}/responses/{item_id}
pub async fn submit_answer(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(DbId, DbId)>,
    Json(input): Json<SubmitAnswerRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let outcome = state
        .controller
        .submit_answer(
            id,
            AnswerSubmission {
                item_id,
                value: input.value,
                skip: input.skip,
                skip_reason: input.skip_reason,
            },
            input.answered_by,
        )
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/checklists/{id}/auto-save
pub async fn auto_save(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AutoSaveRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let outcome = state
        .controller
        .auto_save(id, input.entries, input.answered_by)
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/checklists/{id}/status
pub async fn transition_status(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<StatusRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let instance = state
        .controller
        .transition_status(id, input.status, input.actor_id)
        .await?;
    Ok(Json(DataResponse { data: instance }))
}

/// POST /api/v1/checklists/{id}/lock
pub async fn lock(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<LockRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let instance = state.controller.lock_instance(id, input.actor_id).await?;
    Ok(Json(DataResponse { data: instance }))
}

/// POST /api/v1/checklists/{id}/generated-note
pub async fn set_generated_note(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<GeneratedNoteRequest>,
) -> AppResult<impl IntoResponse> {
    let note = GeneratedNote {
        text: input.text,
        text_secondary: input.text_secondary,
        status: input.status,
    };
    let instance = state.controller.set_generated_note(id, note.clone()).await?;

    clinic_events::publish_note_recorded(&state.event_bus, instance.clinic_id, id, &note);
    Ok(Json(DataResponse { data: instance }))
}
