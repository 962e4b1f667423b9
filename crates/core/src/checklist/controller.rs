//! Checklist instance controller.
//!
//! Owns the instance state machine and runs every answer mutation through
//! the same pipeline: validate, run CDS, persist, then report visibility and
//! progress from the stored instance. Nothing is persisted until validation
//! has succeeded. The store write is a single atomic call that merges the
//! response and recomputes progress over every stored answer.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checklist::cds::{evaluate_alerts, highest_severity, TriggeredAlert};
use crate::checklist::instance::{
    ChecklistInstance, InstanceStatus, NewChecklistInstance, NoteStatus, ResponseHistoryEntry,
    ResponseWrite, StatusChange,
};
use crate::checklist::notes::{NoteEventSink, NoteGenerationRequest};
use crate::checklist::progress::{compute_visibility, evaluate_responses, Progress};
use crate::checklist::template::{AlertSeverity, Item, Template, TemplateSettings};
use crate::checklist::validator::{validate_answer, ValidationError};
use crate::checklist::value::ResponseValue;
use crate::error::CoreError;
use crate::store::{ChecklistStore, GeneratedNote};
use crate::types::{DbId, Timestamp};

/* --------------------------------------------------------------------------
Inputs and outputs
-------------------------------------------------------------------------- */

/// Request to start a checklist for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstance {
    pub clinic_id: DbId,
    pub template_id: DbId,
    /// Pin an explicit version. When absent, `template_id` must be current.
    #[serde(default)]
    pub template_version: Option<i32>,
    pub patient_id: DbId,
    #[serde(default)]
    pub session_id: Option<DbId>,
}

/// One answer mutation: a value, or a justified skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub item_id: DbId,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

/// What the caller needs to re-render after a successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub instance_id: DbId,
    pub item_id: DbId,
    pub status: InstanceStatus,
    pub progress_percentage: f64,
    pub visible_item_ids: Vec<DbId>,
    pub newly_visible_items: Vec<DbId>,
    pub newly_hidden_items: Vec<DbId>,
    pub alerts: Vec<TriggeredAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSaveOutcome {
    pub saved: Vec<SubmitOutcome>,
    pub progress_percentage: f64,
    pub last_auto_saved_at: Timestamp,
}

/// An instance together with its derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistSnapshot {
    pub instance: ChecklistInstance,
    pub visible_item_ids: Vec<DbId>,
    pub progress: Progress,
    pub settings: TemplateSettings,
}

/// Whether an auto-save tick should flush the client buffer.
pub fn auto_save_due(
    last_saved_at: Option<Timestamp>,
    now: Timestamp,
    settings: &TemplateSettings,
) -> bool {
    match last_saved_at {
        None => true,
        Some(last) => {
            (now - last).num_seconds() >= i64::from(settings.auto_save_interval_seconds)
        }
    }
}

/// Turn a submission into the value (or skip reason) to store.
///
/// Requiredness is judged here rather than in the validator: a required
/// item may only be skipped when the template allows skipping.
fn resolve_submission(
    item: &Item,
    settings: &TemplateSettings,
    submission: &AnswerSubmission,
) -> Result<(Option<ResponseValue>, Option<String>), ValidationError> {
    if submission.skip {
        let reason = submission
            .skip_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ValidationError::new(item.id, "A skip requires a reason"))?;
        if item.is_required && !settings.allow_skip {
            return Err(ValidationError::new(item.id, "Required item cannot be skipped"));
        }
        return Ok((None, Some(reason.to_string())));
    }

    let raw = submission.value.as_ref().ok_or_else(|| {
        ValidationError::new(item.id, "An answer value is required unless the item is skipped")
    })?;
    Ok((Some(validate_answer(item, raw)?), None))
}

/* --------------------------------------------------------------------------
Controller
-------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct ChecklistController {
    store: Arc<dyn ChecklistStore>,
    notes: Arc<dyn NoteEventSink>,
}

impl ChecklistController {
    pub fn new(store: Arc<dyn ChecklistStore>, notes: Arc<dyn NoteEventSink>) -> Self {
        Self { store, notes }
    }

    async fn pinned_template(&self, instance: &ChecklistInstance) -> Result<Template, CoreError> {
        Ok(self
            .store
            .load_template(instance.template_id, Some(instance.template_version))
            .await?)
    }

    /// Create an instance pinned to a template version.
    pub async fn create_instance(
        &self,
        input: CreateInstance,
        actor: DbId,
    ) -> Result<ChecklistInstance, CoreError> {
        let template = self
            .store
            .load_template(input.template_id, input.template_version)
            .await?;

        let not_found = CoreError::TemplateNotFound {
            template_id: input.template_id,
            version: input.template_version,
        };
        if input.template_version.is_none() && !template.is_current_version {
            return Err(not_found);
        }
        // Clinic-owned templates are invisible to other clinics.
        if template
            .scope
            .clinic_id()
            .is_some_and(|owner| owner != input.clinic_id)
        {
            return Err(not_found);
        }

        let (_, progress) = evaluate_responses(&template, &[]);

        let instance = self
            .store
            .create_instance(&NewChecklistInstance {
                clinic_id: input.clinic_id,
                template_id: template.id,
                template_version: template.version,
                patient_id: input.patient_id,
                session_id: input.session_id,
                created_by: actor,
                progress_percentage: progress.percentage,
            })
            .await?;

        tracing::info!(
            instance_id = instance.id,
            template_id = template.id,
            template_version = template.version,
            patient_id = instance.patient_id,
            "Checklist instance created"
        );
        Ok(instance)
    }

    /// Load an instance with its visible items and progress.
    pub async fn snapshot(&self, instance_id: DbId) -> Result<ChecklistSnapshot, CoreError> {
        let instance = self.store.load_instance(instance_id).await?;
        let template = self.pinned_template(&instance).await?;

        let (visibility, progress) = evaluate_responses(&template, &instance.responses);

        Ok(ChecklistSnapshot {
            visible_item_ids: visibility.visible_item_ids,
            progress,
            settings: template.settings,
            instance,
        })
    }

    /// Run one answer mutation through the full pipeline.
    pub async fn submit_answer(
        &self,
        instance_id: DbId,
        submission: AnswerSubmission,
        actor: DbId,
    ) -> Result<SubmitOutcome, CoreError> {
        let instance = self.store.load_instance(instance_id).await?;
        if let Err(e) = instance.ensure_unlocked() {
            tracing::warn!(instance_id, item_id = submission.item_id, "Write refused: instance locked");
            return Err(e);
        }
        let template = self.pinned_template(&instance).await?;

        let item_id = submission.item_id;
        let item = template.find_item(item_id).ok_or_else(|| {
            ValidationError::new(item_id, "Item is not part of this checklist")
        })?;

        let (value, skip_reason) =
            resolve_submission(item, &template.settings, &submission).inspect_err(|e| {
                tracing::warn!(instance_id, item_id, reason = %e.reason, "Answer rejected");
            })?;
        tracing::debug!(instance_id, item_id, skipped = submission.skip, "Answer validated");

        let now = Utc::now();
        let triggered_alerts = evaluate_alerts(item, value.as_ref(), now);
        if highest_severity(&triggered_alerts) == Some(AlertSeverity::Critical) {
            tracing::warn!(
                instance_id,
                item_id,
                alerts = triggered_alerts.len(),
                "Critical CDS alert triggered"
            );
        }

        let write = ResponseWrite {
            item_id,
            value: value.clone(),
            is_skipped: submission.skip,
            skip_reason: skip_reason.clone(),
            triggered_alerts,
            history_entry: ResponseHistoryEntry {
                value,
                is_skipped: submission.skip,
                skip_reason,
                changed_by: actor,
                changed_at: now,
            },
            started_at: (instance.status == InstanceStatus::NotStarted).then_some(now),
        };

        // The store merges the write and recomputes progress atomically, so
        // visibility and progress are reported from what it returns.
        let stored = self.store.save_response(instance_id, &template, &write).await?;
        if instance.status == InstanceStatus::NotStarted && stored.status == InstanceStatus::InProgress {
            tracing::info!(instance_id, "Checklist started");
        }

        let before = compute_visibility(&template, &instance.answer_map());
        let (after, _) = evaluate_responses(&template, &stored.responses);
        let (newly_visible_items, newly_hidden_items) = after.diff(&before);
        tracing::debug!(
            instance_id,
            visible = after.visible_item_ids.len(),
            shown = newly_visible_items.len(),
            hidden = newly_hidden_items.len(),
            progress = stored.progress_percentage,
            "Answer stored"
        );

        Ok(SubmitOutcome {
            instance_id,
            item_id,
            status: stored.status,
            progress_percentage: stored.progress_percentage,
            visible_item_ids: after.visible_item_ids,
            newly_visible_items,
            newly_hidden_items,
            alerts: write.triggered_alerts,
        })
    }

    /// Flush a client edit buffer entry by entry. Stops at the first failing
    /// entry; entries before it stay committed.
    pub async fn auto_save(
        &self,
        instance_id: DbId,
        entries: Vec<AnswerSubmission>,
        actor: DbId,
    ) -> Result<AutoSaveOutcome, CoreError> {
        let instance = self.store.load_instance(instance_id).await?;
        instance.ensure_unlocked()?;

        let mut saved = Vec::with_capacity(entries.len());
        for entry in entries {
            saved.push(self.submit_answer(instance_id, entry, actor).await?);
        }

        let now = Utc::now();
        self.store.mark_auto_saved(instance_id, now).await?;

        let progress_percentage = saved
            .last()
            .map_or(instance.progress_percentage, |o| o.progress_percentage);
        tracing::debug!(instance_id, entries = saved.len(), "Auto-save flushed");

        Ok(AutoSaveOutcome {
            saved,
            progress_percentage,
            last_auto_saved_at: now,
        })
    }

    /// Move an instance to `target`, enforcing the state machine.
    pub async fn transition_status(
        &self,
        instance_id: DbId,
        target: InstanceStatus,
        actor: DbId,
    ) -> Result<ChecklistInstance, CoreError> {
        let instance = self.store.load_instance(instance_id).await?;
        instance
            .status
            .check_transition(target, instance_id)
            .inspect_err(|e| tracing::warn!(instance_id, error = %e, "Transition refused"))?;

        let mut note_status = None;
        if target == InstanceStatus::Completed {
            let template = self.pinned_template(&instance).await?;
            if template.settings.require_all_sections {
                let (_, progress) = evaluate_responses(&template, &instance.responses);
                if !progress.missing_item_ids.is_empty() {
                    tracing::warn!(
                        instance_id,
                        missing = progress.missing_item_ids.len(),
                        "Completion refused: required items unanswered"
                    );
                    return Err(CoreError::IncompleteChecklist {
                        item_ids: progress.missing_item_ids,
                    });
                }
            }
            note_status = Some(NoteStatus::Pending);
        }

        let now = Utc::now();
        let change = StatusChange {
            status: target,
            actor,
            at: now,
            note_status,
        };
        self.store.set_instance_status(instance_id, &change).await?;

        tracing::info!(
            instance_id,
            from = %instance.status,
            to = %target,
            actor,
            "Checklist status changed"
        );

        if target == InstanceStatus::Completed {
            self.notes.note_requested(&NoteGenerationRequest {
                instance_id,
                clinic_id: instance.clinic_id,
                patient_id: instance.patient_id,
                status: NoteStatus::Pending,
                requested_by: actor,
                requested_at: now,
            });
        }

        Ok(self.store.load_instance(instance_id).await?)
    }

    /// Lock an instance. Terminal: every later mutation fails.
    pub async fn lock_instance(
        &self,
        instance_id: DbId,
        actor: DbId,
    ) -> Result<ChecklistInstance, CoreError> {
        self.transition_status(instance_id, InstanceStatus::Locked, actor)
            .await
    }

    /// Record the note-generation service's result.
    pub async fn set_generated_note(
        &self,
        instance_id: DbId,
        note: GeneratedNote,
    ) -> Result<ChecklistInstance, CoreError> {
        let instance = self.store.load_instance(instance_id).await?;

        let accepted = matches!(note.status, NoteStatus::Completed | NoteStatus::Failed)
            && instance.note_status != NoteStatus::NotRequested;
        if !accepted {
            return Err(CoreError::InvalidTransition {
                from: instance.note_status.as_str().to_string(),
                to: note.status.as_str().to_string(),
            });
        }

        self.store.save_generated_note(instance_id, &note).await?;
        tracing::info!(instance_id, status = note.status.as_str(), "Generated note recorded");
        Ok(self.store.load_instance(instance_id).await?)
    }
}
