//! End-to-end checklist flows over HTTP against the in-memory store.

mod common;

use axum::http::StatusCode;
use clinic_events::NOTE_REQUESTED;
use common::{answer, build_test_app, expect_status, get, post_json, put_json, start_checklist};
use serde_json::json;

#[tokio::test]
async fn critical_vas_raises_an_alert_that_clears_on_change() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(answer(&app, id, 1, json!({ "value": 8 })).await, StatusCode::OK).await;
    let alerts = json["data"]["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "critical");
    assert_eq!(alerts[0]["message"]["primary"], "Severe pain reported");
    assert_eq!(json["data"]["status"], "in_progress");
    assert_eq!(json["data"]["progress_percentage"], 50.0);

    let json = expect_status(answer(&app, id, 1, json!({ "value": 5 })).await, StatusCode::OK).await;
    assert_eq!(json["data"]["alerts"], json!([]));

    let snapshot = expect_status(get(&app, &format!("/api/v1/checklists/{id}")).await, StatusCode::OK).await;
    let responses = snapshot["data"]["instance"]["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["triggered_alerts"], json!([]));
    assert_eq!(responses[0]["response_history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn conditional_section_appears_and_disappears() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(
        answer(&app, id, 2, json!({ "selected": "yes" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["newly_visible_items"], json!([3]));
    assert_eq!(json["data"]["visible_item_ids"], json!([1, 2, 3]));

    let json = expect_status(
        answer(&app, id, 2, json!({ "selected": "no" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["newly_hidden_items"], json!([3]));
    assert_eq!(json["data"]["visible_item_ids"], json!([1, 2]));
}

#[tokio::test]
async fn invalid_answer_is_rejected_without_side_effects() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(
        answer(&app, id, 1, json!({ "value": 11 })).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let json = expect_status(
        answer(&app, id, 99, json!({ "value": 1 })).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let snapshot = expect_status(get(&app, &format!("/api/v1/checklists/{id}")).await, StatusCode::OK).await;
    assert_eq!(snapshot["data"]["instance"]["status"], "not_started");
    assert_eq!(snapshot["data"]["instance"]["responses"], json!([]));
}

#[tokio::test]
async fn required_item_cannot_be_skipped_when_template_forbids_it() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(
        put_json(
            &app,
            &format!("/api/v1/checklists/{id}/responses/1"),
            json!({ "skip": true, "skip_reason": "Patient declined", "answered_by": 2 }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn completion_requires_every_visible_required_item() {
    let (app, bus) = build_test_app();
    let mut events = bus.subscribe();
    let (_, id) = start_checklist(&app, true).await;
    let status_uri = format!("/api/v1/checklists/{id}/status");

    expect_status(answer(&app, id, 1, json!({ "value": 4 })).await, StatusCode::OK).await;
    expect_status(answer(&app, id, 2, json!({ "selected": "yes" })).await, StatusCode::OK).await;

    let json = expect_status(
        post_json(&app, &status_uri, json!({ "status": "completed", "actor_id": 2 })).await,
        StatusCode::UNPROCESSABLE_ENTITY,
    )
    .await;
    assert_eq!(json["code"], "INCOMPLETE_CHECKLIST");
    assert_eq!(json["item_ids"], json!([3]));

    let json = expect_status(answer(&app, id, 3, json!({ "checked": true })).await, StatusCode::OK).await;
    assert_eq!(json["data"]["progress_percentage"], 100.0);

    let json = expect_status(
        post_json(&app, &status_uri, json!({ "status": "completed", "actor_id": 2 })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["note_status"], "pending");
    assert!(json["data"]["completed_at"].is_string());

    let event = loop {
        let event = events.recv().await.unwrap();
        if event.event_type == NOTE_REQUESTED {
            break event;
        }
    };
    assert_eq!(event.clinic_id, Some(10));
    assert_eq!(event.payload["instance_id"], id);
}

#[tokio::test]
async fn locked_checklist_refuses_every_write() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    expect_status(answer(&app, id, 1, json!({ "value": 3 })).await, StatusCode::OK).await;
    let json = expect_status(
        post_json(&app, &format!("/api/v1/checklists/{id}/lock"), json!({ "actor_id": 5 })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "locked");
    assert_eq!(json["data"]["locked_by"], 5);

    let json = expect_status(
        answer(&app, id, 1, json!({ "value": 4 })).await,
        StatusCode::LOCKED,
    )
    .await;
    assert_eq!(json["code"], "INSTANCE_LOCKED");

    let json = expect_status(
        post_json(
            &app,
            &format!("/api/v1/checklists/{id}/auto-save"),
            json!({ "entries": [], "answered_by": 2 }),
        )
        .await,
        StatusCode::LOCKED,
    )
    .await;
    assert_eq!(json["code"], "INSTANCE_LOCKED");

    expect_status(
        post_json(
            &app,
            &format!("/api/v1/checklists/{id}/status"),
            json!({ "status": "in_progress", "actor_id": 2 }),
        )
        .await,
        StatusCode::LOCKED,
    )
    .await;
}

#[tokio::test]
async fn illegal_transition_is_a_conflict() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(
        post_json(
            &app,
            &format!("/api/v1/checklists/{id}/status"),
            json!({ "status": "reviewed", "actor_id": 2 }),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn auto_save_applies_entries_in_order() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(
        post_json(
            &app,
            &format!("/api/v1/checklists/{id}/auto-save"),
            json!({
                "entries": [
                    { "item_id": 1, "value": { "value": 9 } },
                    { "item_id": 2, "value": { "selected": "no" } }
                ],
                "answered_by": 2
            }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["saved"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["progress_percentage"], 100.0);
    assert!(json["data"]["last_auto_saved_at"].is_string());
    assert_eq!(json["data"]["saved"][0]["alerts"][0]["severity"], "critical");

    let snapshot = expect_status(get(&app, &format!("/api/v1/checklists/{id}")).await, StatusCode::OK).await;
    assert_eq!(
        snapshot["data"]["instance"]["last_auto_saved_at"],
        json["data"]["last_auto_saved_at"]
    );
    assert_eq!(snapshot["data"]["settings"]["auto_save_interval_seconds"], 30);
}

#[tokio::test]
async fn generated_note_is_recorded_after_completion() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;
    let note_uri = format!("/api/v1/checklists/{id}/generated-note");
    let note = json!({ "text": "Patient reports lumbar pain.", "status": "completed" });

    // No note has been requested yet.
    expect_status(post_json(&app, &note_uri, note.clone()).await, StatusCode::CONFLICT).await;

    expect_status(
        post_json(
            &app,
            &format!("/api/v1/checklists/{id}/status"),
            json!({ "status": "in_progress", "actor_id": 2 }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    expect_status(
        post_json(
            &app,
            &format!("/api/v1/checklists/{id}/status"),
            json!({ "status": "completed", "actor_id": 2 }),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    let json = expect_status(post_json(&app, &note_uri, note).await, StatusCode::OK).await;
    assert_eq!(json["data"]["note_status"], "completed");
    assert_eq!(json["data"]["generated_note"], "Patient reports lumbar pain.");
}

#[tokio::test]
async fn checklist_for_another_clinic_is_not_found() {
    let (app, _) = build_test_app();
    let (template_id, _) = start_checklist(&app, false).await;

    let json = expect_status(
        post_json(
            &app,
            "/api/v1/checklists",
            json!({
                "clinic_id": 11,
                "template_id": template_id,
                "patient_id": 77,
                "created_by": 2
            }),
        )
        .await,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn missing_checklist_is_not_found() {
    let (app, _) = build_test_app();
    let response = get(&app, "/api/v1/checklists/4242").await;
    let json = expect_status(response, StatusCode::NOT_FOUND).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn request_field_checks_return_bad_request() {
    let (app, _) = build_test_app();
    let (_, id) = start_checklist(&app, false).await;

    let json = expect_status(
        put_json(
            &app,
            &format!("/api/v1/checklists/{id}/responses/1"),
            json!({ "value": { "value": 3 }, "answered_by": 0 }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(json["code"], "BAD_REQUEST");
}
