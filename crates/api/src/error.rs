use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clinic_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for engine failures and adds request-shape failures.
/// Every variant renders as `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Request body failed its declarative field checks.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut item_ids = None;

        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(err) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    err.to_string(),
                ),
                CoreError::InvalidTemplate(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_TEMPLATE", msg.clone())
                }
                CoreError::InstanceLocked { .. } => {
                    (StatusCode::LOCKED, "INSTANCE_LOCKED", core.to_string())
                }
                CoreError::IncompleteChecklist { item_ids: ids } => {
                    item_ids = Some(ids.clone());
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "INCOMPLETE_CHECKLIST",
                        core.to_string(),
                    )
                }
                CoreError::TemplateNotFound { .. } | CoreError::InstanceNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string())
                }
                CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", core.to_string())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Storage(msg) => {
                    tracing::error!(error = %msg, "Checklist storage error");
                    internal()
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(ids) = item_ids {
            body["item_ids"] = json!(ids);
        }

        (status, axum::Json(body)).into_response()
    }
}
