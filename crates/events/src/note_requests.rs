//! Note-generation requests on the event bus.
//!
//! The checklist engine fires a request when an instance is completed; the
//! external note service subscribes to [`NOTE_REQUESTED`] and later reports
//! back through the API, which publishes [`NOTE_RECORDED`].

use clinic_core::checklist::notes::{NoteEventSink, NoteGenerationRequest};
use clinic_core::store::GeneratedNote;
use clinic_core::types::DbId;

use crate::bus::{ClinicEvent, EventBus};

pub const NOTE_REQUESTED: &str = "checklist.note.requested";
pub const NOTE_RECORDED: &str = "checklist.note.recorded";

const INSTANCE_ENTITY: &str = "checklist_instance";

impl NoteEventSink for EventBus {
    fn note_requested(&self, request: &NoteGenerationRequest) {
        let event = ClinicEvent::new(NOTE_REQUESTED)
            .in_clinic(request.clinic_id)
            .about(INSTANCE_ENTITY, request.instance_id)
            .by(request.requested_by)
            .at(request.requested_at)
            .with_payload(serde_json::json!({
                "instance_id": request.instance_id,
                "patient_id": request.patient_id,
                "status": request.status.as_str(),
            }));
        let receivers = self.publish(event);
        tracing::debug!(instance_id = request.instance_id, receivers, "Note generation requested");
    }
}

/// Announce that the note service's result has been stored.
pub fn publish_note_recorded(bus: &EventBus, clinic_id: DbId, instance_id: DbId, note: &GeneratedNote) {
    bus.publish(
        ClinicEvent::new(NOTE_RECORDED)
            .in_clinic(clinic_id)
            .about(INSTANCE_ENTITY, instance_id)
            .with_payload(serde_json::json!({
                "instance_id": instance_id,
                "status": note.status.as_str(),
            })),
    );
}
