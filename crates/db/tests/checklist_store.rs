//! Integration tests for `PgChecklistStore` against a real database.
//!
//! Exercises the storage port over the migrated schema:
//! - Creating a lineage and superseding it moves `is_current_version`
//! - Superseding the same version twice is a conflict and leaves one successor
//! - A second current lineage for the same scope and purpose is a conflict
//! - Template loads honour the version filter
//! - Response upserts keep one row per item and append to its history
//! - The first write implicitly starts the checklist
//! - Progress is recomputed from every stored answer, including under
//!   concurrent writers
//! - Writes to a locked instance are refused
//! - Auto-save stamps and generated notes report missing instances

use assert_matches::assert_matches;
use chrono::Utc;
use clinic_core::checklist::instance::{
    InstanceStatus, NewChecklistInstance, NoteStatus, ResponseHistoryEntry, ResponseWrite,
    StatusChange,
};
use clinic_core::checklist::template::{
    FormPurpose, Item, ItemConfig, LocalizedText, NewTemplateVersion, Section, Template,
    TemplateScope, TemplateSettings,
};
use clinic_core::checklist::value::{CheckboxAnswer, ResponseValue};
use clinic_core::store::{ChecklistStore, GeneratedNote, StoreError};
use clinic_core::types::DbId;
use clinic_db::PgChecklistStore;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_checkbox(id: DbId) -> Item {
    Item {
        id,
        label: LocalizedText::new(format!("Item {id}")),
        help_text: None,
        config: ItemConfig::Checkbox,
        sort_order: id as i32,
        is_required: true,
        validation: None,
        visibility: Vec::new(),
        cds_rules: Vec::new(),
    }
}

/// One section holding two required checkboxes.
fn new_template(scope: TemplateScope, version: i32, previous_version_id: Option<DbId>) -> NewTemplateVersion {
    NewTemplateVersion {
        scope,
        purpose: FormPurpose::InitialEvaluation,
        name: LocalizedText::new("Lower Back Pain").with_secondary("Dolor lumbar"),
        description: None,
        version,
        previous_version_id,
        settings: TemplateSettings::default(),
        sections: vec![Section {
            id: 1,
            title: LocalizedText::new("Screening"),
            description: None,
            sort_order: 1,
            is_required: true,
            visibility: Vec::new(),
            items: vec![new_checkbox(1), new_checkbox(2)],
        }],
        created_by: 1,
    }
}

fn new_instance(template_id: DbId) -> NewChecklistInstance {
    NewChecklistInstance {
        clinic_id: 10,
        template_id,
        template_version: 1,
        patient_id: 77,
        session_id: None,
        created_by: 1,
        progress_percentage: 0.0,
    }
}

fn new_write(item_id: DbId, checked: bool, started: bool) -> ResponseWrite {
    let now = Utc::now();
    let value = Some(ResponseValue::Checkbox(CheckboxAnswer { checked }));
    ResponseWrite {
        item_id,
        value: value.clone(),
        is_skipped: false,
        skip_reason: None,
        triggered_alerts: Vec::new(),
        history_entry: ResponseHistoryEntry {
            value,
            is_skipped: false,
            skip_reason: None,
            changed_by: 2,
            changed_at: now,
        },
        started_at: started.then_some(now),
    }
}

/// Store a template and start an instance of it.
async fn seed(store: &PgChecklistStore) -> (Template, DbId) {
    let template_id = store
        .save_template_version(&new_template(TemplateScope::Clinic(10), 1, None))
        .await
        .unwrap();
    let template = store.load_template(template_id, None).await.unwrap();
    let instance = store.create_instance(&new_instance(template_id)).await.unwrap();
    (template, instance.id)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn superseding_moves_the_current_flag(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let v1 = store
        .save_template_version(&new_template(TemplateScope::Clinic(10), 1, None))
        .await
        .unwrap();
    let v2 = store
        .save_template_version(&new_template(TemplateScope::Clinic(10), 2, Some(v1)))
        .await
        .unwrap();

    let old = store.load_template(v1, None).await.unwrap();
    let new = store.load_template(v2, Some(2)).await.unwrap();
    assert!(!old.is_current_version);
    assert!(new.is_current_version);
    assert_eq!(new.previous_version_id, Some(v1));
    assert_eq!(new.sections[0].items.len(), 2);

    let current = store
        .find_current_template(TemplateScope::Clinic(10), FormPurpose::InitialEvaluation)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.id, v2);
}

#[sqlx::test(migrations = "./migrations")]
async fn superseding_twice_is_a_conflict(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let v1 = store
        .save_template_version(&new_template(TemplateScope::Global, 1, None))
        .await
        .unwrap();
    store
        .save_template_version(&new_template(TemplateScope::Global, 2, Some(v1)))
        .await
        .unwrap();

    let result = store
        .save_template_version(&new_template(TemplateScope::Global, 2, Some(v1)))
        .await;
    assert_matches!(result, Err(StoreError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn second_current_lineage_is_a_conflict(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    store
        .save_template_version(&new_template(TemplateScope::Global, 1, None))
        .await
        .unwrap();

    let result = store
        .save_template_version(&new_template(TemplateScope::Global, 1, None))
        .await;
    assert_matches!(result, Err(StoreError::Conflict(_)));

    // A clinic lineage for the same purpose is a different scope.
    store
        .save_template_version(&new_template(TemplateScope::Clinic(10), 1, None))
        .await
        .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn missing_template_or_version_is_not_found(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let id = store
        .save_template_version(&new_template(TemplateScope::Clinic(10), 1, None))
        .await
        .unwrap();

    assert_matches!(
        store.load_template(id, Some(2)).await,
        Err(StoreError::TemplateNotFound { version: Some(2), .. })
    );
    assert_matches!(
        store
            .save_template_version(&new_template(TemplateScope::Clinic(10), 2, Some(id + 100)))
            .await,
        Err(StoreError::TemplateNotFound { .. })
    );
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn upsert_keeps_one_row_and_appends_history(pool: PgPool) {
    let store = PgChecklistStore::new(pool.clone());
    let (template, id) = seed(&store).await;

    let first = store.save_response(id, &template, &new_write(1, true, true)).await.unwrap();
    assert_eq!(first.status, InstanceStatus::InProgress);
    assert!(first.started_at.is_some());
    assert_eq!(first.progress_percentage, 50.0);

    let second = store.save_response(id, &template, &new_write(1, false, false)).await.unwrap();
    assert_eq!(second.started_at, first.started_at);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checklist_responses WHERE instance_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let loaded = store.load_instance(id).await.unwrap();
    let response = loaded.response(1).unwrap();
    assert_eq!(response.response_history.len(), 2);
    assert_eq!(
        response.value,
        Some(ResponseValue::Checkbox(CheckboxAnswer { checked: false }))
    );
    assert_eq!(loaded.progress_percentage, second.progress_percentage);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_writers_both_count_towards_progress(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let (template, id) = seed(&store).await;

    let first = new_write(1, true, true);
    let second = new_write(2, true, true);
    let (a, b) = tokio::join!(
        store.save_response(id, &template, &first),
        store.save_response(id, &template, &second),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.progress_percentage.max(b.progress_percentage), 100.0);

    let loaded = store.load_instance(id).await.unwrap();
    assert_eq!(loaded.responses.len(), 2);
    assert_eq!(loaded.progress_percentage, 100.0);
    assert_eq!(loaded.status, InstanceStatus::InProgress);
}

#[sqlx::test(migrations = "./migrations")]
async fn locked_instance_refuses_writes(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let (template, id) = seed(&store).await;

    store
        .set_instance_status(
            id,
            &StatusChange {
                status: InstanceStatus::Locked,
                actor: 3,
                at: Utc::now(),
                note_status: None,
            },
        )
        .await
        .unwrap();

    assert_matches!(
        store.save_response(id, &template, &new_write(1, true, true)).await,
        Err(StoreError::Locked { instance_id }) if instance_id == id
    );
    let loaded = store.load_instance(id).await.unwrap();
    assert_eq!(loaded.locked_by, Some(3));
    assert!(loaded.responses.is_empty());
}

// ---------------------------------------------------------------------------
// Instance bookkeeping
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn missing_instance_is_not_found(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let (template, _) = seed(&store).await;
    let note = GeneratedNote {
        text: Some("Patient reports moderate pain.".into()),
        text_secondary: None,
        status: NoteStatus::Completed,
    };

    assert_matches!(store.load_instance(999).await, Err(StoreError::InstanceNotFound { .. }));
    assert_matches!(
        store.save_response(999, &template, &new_write(1, true, true)).await,
        Err(StoreError::InstanceNotFound { .. })
    );
    assert_matches!(
        store.mark_auto_saved(999, Utc::now()).await,
        Err(StoreError::InstanceNotFound { .. })
    );
    assert_matches!(
        store.save_generated_note(999, &note).await,
        Err(StoreError::InstanceNotFound { .. })
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn auto_save_stamp_and_generated_note_are_stored(pool: PgPool) {
    let store = PgChecklistStore::new(pool);
    let (_, id) = seed(&store).await;

    store.mark_auto_saved(id, Utc::now()).await.unwrap();
    store
        .save_generated_note(
            id,
            &GeneratedNote {
                text: Some("Patient reports moderate pain.".into()),
                text_secondary: Some("El paciente refiere dolor moderado.".into()),
                status: NoteStatus::Completed,
            },
        )
        .await
        .unwrap();

    let loaded = store.load_instance(id).await.unwrap();
    assert!(loaded.last_auto_saved_at.is_some());
    assert_eq!(loaded.note_status, NoteStatus::Completed);
    assert_eq!(loaded.generated_note_secondary.as_deref(), Some("El paciente refiere dolor moderado."));
}
