//! In-process [`ChecklistStore`] used by tests and by the API server when no
//! database is configured.
//!
//! A single mutex guards all tables, so every trait call is atomic with
//! respect to the others.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ChecklistStore, GeneratedNote, StoreError, StoreResult};
use crate::checklist::instance::{
    ChecklistInstance, InstanceStatus, NewChecklistInstance, NoteStatus, ResponseWrite,
    StatusChange,
};
use crate::checklist::progress::evaluate_responses;
use crate::checklist::template::{FormPurpose, NewTemplateVersion, Template, TemplateScope};
use crate::types::{DbId, Timestamp};

#[derive(Default)]
struct Tables {
    templates: HashMap<DbId, Template>,
    instances: HashMap<DbId, ChecklistInstance>,
    next_template_id: DbId,
    next_instance_id: DbId,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn instance_mut(tables: &mut Tables, instance_id: DbId) -> StoreResult<&mut ChecklistInstance> {
    tables
        .instances
        .get_mut(&instance_id)
        .ok_or(StoreError::InstanceNotFound { instance_id })
}

#[async_trait]
impl ChecklistStore for InMemoryStore {
    async fn load_template(&self, id: DbId, version: Option<i32>) -> StoreResult<Template> {
        let tables = self.tables.lock().await;
        tables
            .templates
            .get(&id)
            .filter(|t| version.map_or(true, |v| t.version == v))
            .cloned()
            .ok_or(StoreError::TemplateNotFound {
                template_id: id,
                version,
            })
    }

    async fn find_current_template(
        &self,
        scope: TemplateScope,
        purpose: FormPurpose,
    ) -> StoreResult<Option<Template>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .templates
            .values()
            .find(|t| t.is_current_version && t.scope == scope && t.purpose == purpose)
            .cloned())
    }

    async fn save_template_version(&self, template: &NewTemplateVersion) -> StoreResult<DbId> {
        let mut tables = self.tables.lock().await;

        // Check everything before touching anything.
        if let Some(previous_id) = template.previous_version_id {
            let previous = tables.templates.get(&previous_id).ok_or(StoreError::TemplateNotFound {
                template_id: previous_id,
                version: None,
            })?;
            if !previous.is_current_version {
                return Err(StoreError::Conflict(format!(
                    "Template {previous_id} has already been superseded"
                )));
            }
        } else if tables.templates.values().any(|t| {
            t.is_current_version && t.scope == template.scope && t.purpose == template.purpose
        }) {
            return Err(StoreError::Conflict(format!(
                "A current '{}' template already exists for this scope",
                template.purpose
            )));
        }

        if let Some(previous_id) = template.previous_version_id {
            if let Some(previous) = tables.templates.get_mut(&previous_id) {
                previous.is_current_version = false;
            }
        }

        tables.next_template_id += 1;
        let id = tables.next_template_id;
        tables
            .templates
            .insert(id, template.clone().into_template(id, Utc::now()));
        Ok(id)
    }

    async fn create_instance(&self, instance: &NewChecklistInstance) -> StoreResult<ChecklistInstance> {
        let mut tables = self.tables.lock().await;
        tables.next_instance_id += 1;
        let now = Utc::now();
        let created = ChecklistInstance {
            id: tables.next_instance_id,
            clinic_id: instance.clinic_id,
            template_id: instance.template_id,
            template_version: instance.template_version,
            patient_id: instance.patient_id,
            session_id: instance.session_id,
            created_by: instance.created_by,
            status: InstanceStatus::NotStarted,
            progress_percentage: instance.progress_percentage,
            started_at: None,
            completed_at: None,
            reviewed_by: None,
            reviewed_at: None,
            locked_at: None,
            locked_by: None,
            last_auto_saved_at: None,
            note_status: NoteStatus::NotRequested,
            generated_note: None,
            generated_note_secondary: None,
            responses: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.instances.insert(created.id, created.clone());
        Ok(created)
    }

    async fn load_instance(&self, id: DbId) -> StoreResult<ChecklistInstance> {
        let tables = self.tables.lock().await;
        tables
            .instances
            .get(&id)
            .cloned()
            .ok_or(StoreError::InstanceNotFound { instance_id: id })
    }

    async fn save_response(
        &self,
        instance_id: DbId,
        template: &Template,
        write: &ResponseWrite,
    ) -> StoreResult<ChecklistInstance> {
        let mut tables = self.tables.lock().await;
        let instance = instance_mut(&mut tables, instance_id)?;
        if instance.is_locked() {
            return Err(StoreError::Locked { instance_id });
        }

        match instance
            .responses
            .iter()
            .position(|r| r.item_id == write.item_id)
        {
            Some(index) => {
                let existing = instance.responses[index].clone();
                instance.responses[index] = write.apply_to(Some(existing));
            }
            None => instance.responses.push(write.apply_to(None)),
        }

        let (_, progress) = evaluate_responses(template, &instance.responses);
        instance.progress_percentage = progress.percentage;
        if let Some(started_at) = write.started_at {
            if instance.status == InstanceStatus::NotStarted {
                instance.status = InstanceStatus::InProgress;
                instance.started_at = Some(started_at);
            }
        }
        instance.updated_at = write.history_entry.changed_at;
        Ok(instance.clone())
    }

    async fn set_instance_status(&self, instance_id: DbId, change: &StatusChange) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let instance = instance_mut(&mut tables, instance_id)?;
        if instance.is_locked() {
            return Err(StoreError::Locked { instance_id });
        }
        change.apply_to(instance);
        Ok(())
    }

    async fn mark_auto_saved(&self, instance_id: DbId, at: Timestamp) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let instance = instance_mut(&mut tables, instance_id)?;
        instance.last_auto_saved_at = Some(at);
        Ok(())
    }

    async fn save_generated_note(&self, instance_id: DbId, note: &GeneratedNote) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let instance = instance_mut(&mut tables, instance_id)?;
        instance.note_status = note.status;
        instance.generated_note = note.text.clone();
        instance.generated_note_secondary = note.text_secondary.clone();
        instance.updated_at = Utc::now();
        Ok(())
    }
}
