//! Hand-off to the external note-generation service.

use serde::{Deserialize, Serialize};

use crate::checklist::instance::NoteStatus;
use crate::types::{DbId, Timestamp};

/// Emitted when an instance transitions into `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteGenerationRequest {
    pub instance_id: DbId,
    pub clinic_id: DbId,
    pub patient_id: DbId,
    /// Always [`NoteStatus::Pending`] at emission time.
    pub status: NoteStatus,
    pub requested_by: DbId,
    pub requested_at: Timestamp,
}

/// Receives note-generation requests. Implementations must not block: the
/// controller fires and forgets.
pub trait NoteEventSink: Send + Sync {
    fn note_requested(&self, request: &NoteGenerationRequest);
}
