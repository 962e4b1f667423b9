//! Storage port for templates and checklist instances.
//!
//! The controller calls these synchronously (one awaited call at a time) and
//! never retries: a failure is surfaced to the caller as-is.

pub mod memory;

use async_trait::async_trait;

use crate::checklist::instance::{ChecklistInstance, NewChecklistInstance, ResponseWrite, StatusChange};
use crate::checklist::template::{FormPurpose, NewTemplateVersion, Template, TemplateScope};
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

pub use memory::InMemoryStore;

/// Failure reported by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Template {template_id} not found")]
    TemplateNotFound {
        template_id: DbId,
        version: Option<i32>,
    },

    #[error("Checklist instance {instance_id} not found")]
    InstanceNotFound { instance_id: DbId },

    /// The instance was locked before the write could land.
    #[error("Checklist instance {instance_id} is locked")]
    Locked { instance_id: DbId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TemplateNotFound {
                template_id,
                version,
            } => CoreError::TemplateNotFound {
                template_id,
                version,
            },
            StoreError::InstanceNotFound { instance_id } => {
                CoreError::InstanceNotFound { instance_id }
            }
            StoreError::Locked { instance_id } => CoreError::InstanceLocked { instance_id },
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Backend(msg) => CoreError::Storage(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ChecklistStore: Send + Sync {
    /// Load a template record. With `version`, the record must also carry
    /// that version number.
    async fn load_template(&self, id: DbId, version: Option<i32>) -> StoreResult<Template>;

    /// The current version for a (scope, purpose) pair, if any.
    async fn find_current_template(
        &self,
        scope: TemplateScope,
        purpose: FormPurpose,
    ) -> StoreResult<Option<Template>>;

    /// Store a new template version and return its id.
    ///
    /// When `previous_version_id` is set, that record's current flag is
    /// cleared in the same atomic step; if it is no longer current the whole
    /// operation fails with [`StoreError::Conflict`].
    async fn save_template_version(&self, template: &NewTemplateVersion) -> StoreResult<DbId>;

    async fn create_instance(&self, instance: &NewChecklistInstance) -> StoreResult<ChecklistInstance>;

    /// Load an instance with all of its responses.
    async fn load_instance(&self, id: DbId) -> StoreResult<ChecklistInstance>;

    /// Upsert one response, appending to its history, then recompute progress
    /// over the merged responses against `template`. Both happen in the same
    /// atomic step, so concurrent writers never record a stale percentage.
    /// Refused with [`StoreError::Locked`] if the instance is locked.
    ///
    /// Returns the instance as stored after the write.
    async fn save_response(
        &self,
        instance_id: DbId,
        template: &Template,
        write: &ResponseWrite,
    ) -> StoreResult<ChecklistInstance>;

    async fn set_instance_status(&self, instance_id: DbId, change: &StatusChange) -> StoreResult<()>;

    async fn mark_auto_saved(&self, instance_id: DbId, at: Timestamp) -> StoreResult<()>;

    async fn save_generated_note(
        &self,
        instance_id: DbId,
        note: &GeneratedNote,
    ) -> StoreResult<()>;
}

/// Output of the external note-generation service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeneratedNote {
    pub text: Option<String>,
    pub text_secondary: Option<String>,
    pub status: crate::checklist::instance::NoteStatus,
}
