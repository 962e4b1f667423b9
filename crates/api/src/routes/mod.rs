pub mod checklists;
pub mod health;
pub mod templates;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /checklist-templates                         author version 1 (POST)
/// /checklist-templates/{id}                    get, optionally ?version= (GET)
/// /checklist-templates/{id}/history            version chain, newest first (GET)
/// /checklist-templates/{id}/versions           supersede with a new version (POST)
///
/// /checklists                                  create instance (POST)
/// /checklists/{id}                             snapshot (GET)
/// /checklists/{id}/responses/{item_id}         submit answer or skip (PUT)
/// /checklists/{id}/auto-save                   flush edit buffer (POST)
/// /checklists/{id}/status                      status transition (POST)
/// /checklists/{id}/lock                        lock (POST)
/// /checklists/{id}/generated-note              note service callback (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/checklist-templates", templates::router())
        .nest("/checklists", checklists::router())
}
