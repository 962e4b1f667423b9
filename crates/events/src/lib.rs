//! Clinic domain events.
//!
//! - [`EventBus`]: in-process fan-out hub over `tokio::sync::broadcast`.
//! - [`ClinicEvent`]: the event envelope carried on the bus.
//! - [`note_requests`]: bridges the checklist engine's note-generation
//!   requests onto the bus.

pub mod bus;
pub mod note_requests;

pub use bus::{log_events, ClinicEvent, EntityRef, EventBus};
pub use note_requests::{publish_note_recorded, NOTE_RECORDED, NOTE_REQUESTED};
