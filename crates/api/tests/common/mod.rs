#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use clinic_api::config::ServerConfig;
use clinic_api::router::build_app_router;
use clinic_api::state::AppState;
use clinic_core::store::InMemoryStore;
use clinic_events::EventBus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Test `ServerConfig` with safe defaults and no database.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
    }
}

/// The full application over a fresh in-memory store, plus its event bus so
/// tests can observe published events.
pub fn build_test_app() -> (Router, Arc<EventBus>) {
    let config = Arc::new(test_config());
    let event_bus = Arc::new(EventBus::default());
    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        Arc::clone(&event_bus),
        Arc::clone(&config),
        None,
    );
    (build_app_router(state, &config), event_bus)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send and assert the status, returning the parsed body.
pub async fn expect_status(response: Response<Body>, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// "Lower Back Pain" initial evaluation for clinic 10.
///
/// Section 1: required VAS (item 1, alerts above 7) and a required
/// "radiating pain?" radio (item 2). Section 2 is shown only when item 2 is
/// "yes" and holds a required checkbox (item 3).
pub fn lower_back_pain(require_all_sections: bool) -> Value {
    json!({
        "clinic_id": 10,
        "purpose": "initial_evaluation",
        "name": { "primary": "Lower Back Pain", "secondary": "Dolor lumbar" },
        "settings": {
            "allow_skip": false,
            "require_all_sections": require_all_sections,
            "auto_save_interval_seconds": 30,
            "show_progress_bar": true
        },
        "sections": [
            {
                "id": 1,
                "title": { "primary": "Pain" },
                "sort_order": 1,
                "items": [
                    {
                        "id": 1,
                        "label": { "primary": "Pain Severity (VAS)" },
                        "config": { "item_type": "scale", "min": 0, "max": 10, "step": 1 },
                        "sort_order": 1,
                        "is_required": true,
                        "cds_rules": [{
                            "operator": "greater_than",
                            "value": 7,
                            "severity": "critical",
                            "message": { "primary": "Severe pain reported" }
                        }]
                    },
                    {
                        "id": 2,
                        "label": { "primary": "Radiating pain?" },
                        "config": {
                            "item_type": "radio",
                            "options": [
                                { "value": "yes", "label": { "primary": "Yes" } },
                                { "value": "no", "label": { "primary": "No" } }
                            ]
                        },
                        "sort_order": 2,
                        "is_required": true
                    }
                ]
            },
            {
                "id": 2,
                "title": { "primary": "Radiation" },
                "sort_order": 2,
                "visibility": [
                    { "target_item_id": 2, "operator": "equals", "value": "yes" }
                ],
                "items": [
                    {
                        "id": 3,
                        "label": { "primary": "Numbness below the knee" },
                        "config": { "item_type": "checkbox" },
                        "sort_order": 1,
                        "is_required": true
                    }
                ]
            }
        ],
        "created_by": 1
    })
}

/// Author the template and start a checklist on it; returns
/// `(template_id, instance_id)`.
pub async fn start_checklist(app: &Router, require_all_sections: bool) -> (i64, i64) {
    let template = expect_status(
        post_json(app, "/api/v1/checklist-templates", lower_back_pain(require_all_sections)).await,
        StatusCode::CREATED,
    )
    .await;
    let template_id = template["data"]["id"].as_i64().unwrap();

    let instance = expect_status(
        post_json(
            app,
            "/api/v1/checklists",
            json!({
                "clinic_id": 10,
                "template_id": template_id,
                "patient_id": 77,
                "created_by": 2
            }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    (template_id, instance["data"]["id"].as_i64().unwrap())
}

pub async fn answer(app: &Router, instance_id: i64, item_id: i64, value: Value) -> Response<Body> {
    put_json(
        app,
        &format!("/api/v1/checklists/{instance_id}/responses/{item_id}"),
        json!({ "value": value, "answered_by": 2 }),
    )
    .await
}
