use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::checklists;
use crate::state::AppState;

/// Routes mounted at `/checklists`.
///
/// ```text
/// POST   /                              -> create
/// GET    /{id}                          -> get_snapshot
/// PUT    /{id}/responses/{item_id}      -> submit_answer
/// POST   /{id}/auto-save                -> auto_save
/// POST   /{id}/status                   -> transition_status
/// POST   /{id}/lock                     -> lock
/// POST   /{id}/generated-note           -> set_generated_note
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(checklists::create))
        .route("/{id}", get(checklists::get_snapshot))
        .route("/{id}/responses/{item_id}", put(checklists::submit_answer))
        .route("/{id}/auto-save", post(checklists::auto_save))
        .route("/{id}/status", post(checklists::transition_status))
        .route("/{id}/lock", post(checklists::lock))
        .route("/{id}/generated-note", post(checklists::set_generated_note))
}
