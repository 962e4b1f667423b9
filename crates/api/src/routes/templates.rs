use axum::routing::{get, post};
use axum::Router;

use crate::handlers::templates;
use crate::state::AppState;

/// Routes mounted at `/checklist-templates`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(templates::create_template))
        .route("/{id}", get(templates::get_template))
        .route("/{id}/history", get(templates::version_history))
        .route("/{id}/versions", post(templates::create_version))
}
