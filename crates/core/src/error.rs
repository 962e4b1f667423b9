use crate::checklist::validator::ValidationError;
use crate::types::DbId;

/// Request-scoped failure of a checklist operation.
///
/// None of these leave in-memory state half-applied: derived values
/// (visibility, progress, alerts) are only committed after the triggering
/// write has succeeded.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An answer or authoring payload failed its type/shape constraints.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A template definition is malformed (duplicate ids, dangling rule
    /// targets, inconsistent bounds).
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Checklist instance {instance_id} is locked")]
    InstanceLocked { instance_id: DbId },

    #[error("Checklist is incomplete: {} required item(s) unanswered", .item_ids.len())]
    IncompleteChecklist { item_ids: Vec<DbId> },

    #[error("Template not found: {template_id}{}", .version.map(|v| format!(" (version {v})")).unwrap_or_default())]
    TemplateNotFound {
        template_id: DbId,
        version: Option<i32>,
    },

    #[error("Checklist instance not found: {instance_id}")]
    InstanceNotFound { instance_id: DbId },

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The storage collaborator failed. Surfaced verbatim, never retried here.
    #[error("Storage error: {0}")]
    Storage(String),
}
