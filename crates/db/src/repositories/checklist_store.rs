//! PostgreSQL implementation of the checklist storage port.
//!
//! Multi-row operations (template supersession, response upserts, status
//! changes) run in a transaction and take a row lock on the parent record,
//! so each port call is atomic.

use async_trait::async_trait;
use clinic_core::checklist::instance::{
    ChecklistInstance, NewChecklistInstance, Response, ResponseWrite, StatusChange,
};
use clinic_core::checklist::progress::evaluate_responses;
use clinic_core::checklist::template::{FormPurpose, NewTemplateVersion, Template, TemplateScope};
use clinic_core::store::{ChecklistStore, GeneratedNote, StoreError, StoreResult};
use clinic_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use crate::models::checklist::{InstanceRow, ResponseRow, TemplateRow};

/// Column list for checklist_templates queries.
const TEMPLATE_COLUMNS: &str = "id, clinic_id, purpose, name, description, version, \
    is_current_version, previous_version_id, settings, sections, created_by, created_at";

/// Column list for checklist_instances queries.
const INSTANCE_COLUMNS: &str = "id, clinic_id, template_id, template_version, patient_id, \
    session_id, created_by, status, progress_percentage, started_at, completed_at, \
    reviewed_by, reviewed_at, locked_at, locked_by, last_auto_saved_at, note_status, \
    generated_note, generated_note_secondary, created_at, updated_at";

/// Column list for checklist_responses queries.
const RESPONSE_COLUMNS: &str = "item_id, value, is_skipped, skip_reason, triggered_alerts, \
    response_history, answered_by, answered_at";

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Map an insert failure, turning unique-index violations into conflicts.
fn insert_error(err: sqlx::Error, conflict: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(conflict()),
        _ => backend(err),
    }
}

#[derive(Clone)]
pub struct PgChecklistStore {
    pool: PgPool,
}

impl PgChecklistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the instance row for the rest of the transaction.
    async fn lock_instance_row(
        tx: &mut Transaction<'_, Postgres>,
        instance_id: DbId,
    ) -> StoreResult<ChecklistInstance> {
        let query = format!("SELECT {INSTANCE_COLUMNS} FROM checklist_instances WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, InstanceRow>(&query)
            .bind(instance_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(backend)?
            .ok_or(StoreError::InstanceNotFound { instance_id })?;
        row.into_instance(Vec::new())
    }

    /// All responses of an instance in insertion order.
    async fn fetch_responses<'e>(
        executor: impl PgExecutor<'e>,
        instance_id: DbId,
    ) -> StoreResult<Vec<Response>> {
        let query = format!(
            "SELECT {RESPONSE_COLUMNS} FROM checklist_responses
             WHERE instance_id = $1
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, ResponseRow>(&query)
            .bind(instance_id)
            .fetch_all(executor)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(Response::from).collect())
    }
}

#[async_trait]
impl ChecklistStore for PgChecklistStore {
    async fn load_template(&self, id: DbId, version: Option<i32>) -> StoreResult<Template> {
        let query = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM checklist_templates
             WHERE id = $1 AND ($2::INTEGER IS NULL OR version = $2)"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::TemplateNotFound {
                template_id: id,
                version,
            })?
            .try_into()
    }

    async fn find_current_template(
        &self,
        scope: TemplateScope,
        purpose: FormPurpose,
    ) -> StoreResult<Option<Template>> {
        let query = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM checklist_templates
             WHERE is_current_version
               AND clinic_id IS NOT DISTINCT FROM $1
               AND purpose = $2"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(scope.clinic_id())
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(Template::try_from)
            .transpose()
    }

    async fn save_template_version(&self, template: &NewTemplateVersion) -> StoreResult<DbId> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        if let Some(previous_id) = template.previous_version_id {
            let flipped = sqlx::query(
                "UPDATE checklist_templates SET is_current_version = FALSE
                 WHERE id = $1 AND is_current_version",
            )
            .bind(previous_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();

            if flipped == 0 {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM checklist_templates WHERE id = $1)",
                )
                .bind(previous_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
                return Err(if exists {
                    StoreError::Conflict(format!(
                        "Template {previous_id} has already been superseded"
                    ))
                } else {
                    StoreError::TemplateNotFound {
                        template_id: previous_id,
                        version: None,
                    }
                });
            }
        }

        let id: DbId = sqlx::query_scalar(
            "INSERT INTO checklist_templates
                (clinic_id, purpose, name, description, version, is_current_version,
                 previous_version_id, settings, sections, created_by)
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(template.scope.clinic_id())
        .bind(template.purpose.as_str())
        .bind(Json(&template.name))
        .bind(template.description.as_ref().map(Json))
        .bind(template.version)
        .bind(template.previous_version_id)
        .bind(Json(&template.settings))
        .bind(Json(&template.sections))
        .bind(template.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            insert_error(e, || {
                format!(
                    "A current '{}' template already exists for this scope",
                    template.purpose
                )
            })
        })?;

        tx.commit().await.map_err(backend)?;
        tracing::debug!(template_id = id, version = template.version, "Template version stored");
        Ok(id)
    }

    async fn create_instance(&self, instance: &NewChecklistInstance) -> StoreResult<ChecklistInstance> {
        let query = format!(
            "INSERT INTO checklist_instances
                (clinic_id, template_id, template_version, patient_id, session_id,
                 created_by, progress_percentage)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {INSTANCE_COLUMNS}"
        );
        sqlx::query_as::<_, InstanceRow>(&query)
            .bind(instance.clinic_id)
            .bind(instance.template_id)
            .bind(instance.template_version)
            .bind(instance.patient_id)
            .bind(instance.session_id)
            .bind(instance.created_by)
            .bind(instance.progress_percentage)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?
            .into_instance(Vec::new())
    }

    async fn load_instance(&self, id: DbId) -> StoreResult<ChecklistInstance> {
        let query = format!("SELECT {INSTANCE_COLUMNS} FROM checklist_instances WHERE id = $1");
        let row = sqlx::query_as::<_, InstanceRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::InstanceNotFound { instance_id: id })?;

        let responses = Self::fetch_responses(&self.pool, id).await?;
        row.into_instance(responses)
    }

    async fn save_response(
        &self,
        instance_id: DbId,
        template: &Template,
        write: &ResponseWrite,
    ) -> StoreResult<ChecklistInstance> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let instance = Self::lock_instance_row(&mut tx, instance_id).await?;
        if instance.is_locked() {
            return Err(StoreError::Locked { instance_id });
        }

        // Last write wins on the current columns; history only ever grows.
        sqlx::query(
            "INSERT INTO checklist_responses
                (instance_id, item_id, value, is_skipped, skip_reason, triggered_alerts,
                 response_history, answered_by, answered_at)
             VALUES ($1, $2, $3, $4, $5, $6, jsonb_build_array($7::jsonb), $8, $9)
             ON CONFLICT (instance_id, item_id) DO UPDATE SET
                value = EXCLUDED.value,
                is_skipped = EXCLUDED.is_skipped,
                skip_reason = EXCLUDED.skip_reason,
                triggered_alerts = EXCLUDED.triggered_alerts,
                response_history = checklist_responses.response_history || EXCLUDED.response_history,
                answered_by = EXCLUDED.answered_by,
                answered_at = EXCLUDED.answered_at",
        )
        .bind(instance_id)
        .bind(write.item_id)
        .bind(write.value.as_ref().map(Json))
        .bind(write.is_skipped)
        .bind(&write.skip_reason)
        .bind(Json(&write.triggered_alerts))
        .bind(Json(&write.history_entry))
        .bind(write.history_entry.changed_by)
        .bind(write.history_entry.changed_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // The row lock is still held, so progress reflects every committed write.
        let responses = Self::fetch_responses(&mut *tx, instance_id).await?;
        let (_, progress) = evaluate_responses(template, &responses);

        // Implicit start: only a not-started instance moves to in_progress.
        let query = format!(
            "UPDATE checklist_instances SET
                progress_percentage = $2,
                status = CASE WHEN $3::TIMESTAMPTZ IS NOT NULL AND status = 'not_started'
                              THEN 'in_progress' ELSE status END,
                started_at = CASE WHEN $3::TIMESTAMPTZ IS NOT NULL AND status = 'not_started'
                                  THEN $3 ELSE started_at END,
                updated_at = $4
             WHERE id = $1
             RETURNING {INSTANCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, InstanceRow>(&query)
            .bind(instance_id)
            .bind(progress.percentage)
            .bind(write.started_at)
            .bind(write.history_entry.changed_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        row.into_instance(responses)
    }

    async fn set_instance_status(&self, instance_id: DbId, change: &StatusChange) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let mut instance = Self::lock_instance_row(&mut tx, instance_id).await?;
        if instance.is_locked() {
            return Err(StoreError::Locked { instance_id });
        }
        change.apply_to(&mut instance);

        sqlx::query(
            "UPDATE checklist_instances SET
                status = $2,
                started_at = $3,
                completed_at = $4,
                reviewed_by = $5,
                reviewed_at = $6,
                locked_at = $7,
                locked_by = $8,
                note_status = $9,
                updated_at = $10
             WHERE id = $1",
        )
        .bind(instance_id)
        .bind(instance.status.as_str())
        .bind(instance.started_at)
        .bind(instance.completed_at)
        .bind(instance.reviewed_by)
        .bind(instance.reviewed_at)
        .bind(instance.locked_at)
        .bind(instance.locked_by)
        .bind(instance.note_status.as_str())
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn mark_auto_saved(&self, instance_id: DbId, at: Timestamp) -> StoreResult<()> {
        let affected = sqlx::query(
            "UPDATE checklist_instances SET last_auto_saved_at = $2 WHERE id = $1",
        )
        .bind(instance_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::InstanceNotFound { instance_id });
        }
        Ok(())
    }

    async fn save_generated_note(&self, instance_id: DbId, note: &GeneratedNote) -> StoreResult<()> {
        let affected = sqlx::query(
            "UPDATE checklist_instances SET
                note_status = $2,
                generated_note = $3,
                generated_note_secondary = $4,
                updated_at = now()
             WHERE id = $1",
        )
        .bind(instance_id)
        .bind(note.status.as_str())
        .bind(&note.text)
        .bind(&note.text_secondary)
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::InstanceNotFound { instance_id });
        }
        Ok(())
    }
}
