use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `"postgres"` or `"memory"`.
    pub store: &'static str,
    /// `None` when no database is configured.
    pub db_healthy: Option<bool>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match &state.pool {
        Some(pool) => Some(clinic_db::health_check(pool).await.is_ok()),
        None => None,
    };

    Json(HealthResponse {
        status: if db_healthy == Some(false) { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        store: if state.pool.is_some() { "postgres" } else { "memory" },
        db_healthy,
    })
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
