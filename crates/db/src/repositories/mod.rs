pub mod checklist_store;

pub use checklist_store::PgChecklistStore;
