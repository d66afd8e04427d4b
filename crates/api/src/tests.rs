use std::sync::Arc;

use axum::body::Body;
use axum::body::to_bytes;
use axum::http::{Request, StatusCode};
use cuelab_infra::config::AppConfig;
use cuelab_infra::repositories::InMemoryDocumentRepository;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        store_path: "./data/documents".to_string(),
        lock_ttl_secs: 300,
        session_timeout_secs: 1800,
        event_log_cap: 1000,
        event_channel_capacity: 64,
    }
}

fn test_app() -> axum::Router {
    let state = AppState::with_store(test_config(), Arc::new(InMemoryDocumentRepository::new()));
    routes::router(state)
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder
            .header("x-user-id", user)
            .header("x-user-name", format!("{user}-name"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("response");
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return (status, Value::Null);
    }
    (status, body_json(response).await)
}

fn create_document_body() -> Value {
    json!({
        "title": "Pilot Episode",
        "project_id": "show-1",
        "source_language": "en",
        "target_language": "de",
        "entries": [
            {"sequence": 1, "start_time_ms": 0, "end_time_ms": 900, "original_text": "Hello."},
            {"sequence": 2, "start_time_ms": 1000, "end_time_ms": 1900, "original_text": "Goodbye."}
        ]
    })
}

async fn create_document(app: &axum::Router) -> Value {
    let (status, document) = send(
        app,
        request("POST", "/v1/documents", Some("owner"), Some(create_document_body())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    document
}

async fn open_session(app: &axum::Router, document_id: &str, user: &str) -> String {
    let (status, session) = send(
        app,
        request(
            "POST",
            &format!("/v1/documents/{document_id}/sessions"),
            Some(user),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    session["id"].as_str().expect("session id").to_string()
}

#[tokio::test]
async fn health_reports_environment() {
    let app = test_app();
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn create_document_requires_identity() {
    let app = test_app();
    let (status, body) = send(
        &app,
        request("POST", "/v1/documents", None, Some(create_document_body())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let app = test_app();
    let (status, body) = send(&app, request("GET", "/v1/documents/nope", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn lock_edit_unlock_flow_with_conflict() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();
    let entry_id = document["entries"][0]["id"].as_str().unwrap();

    let alice = open_session(&app, document_id, "alice").await;
    let bob = open_session(&app, document_id, "bob").await;

    let (status, handle) = send(
        &app,
        request(
            "POST",
            &format!("/v1/sessions/{alice}/entries/{entry_id}/lock"),
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(handle["holder_session_id"], alice.as_str());

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/v1/sessions/{bob}/entries/{entry_id}/lock"),
            Some("bob"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, change) = send(
        &app,
        request(
            "POST",
            &format!("/v1/sessions/{alice}/entries/{entry_id}/edit"),
            Some("alice"),
            Some(json!({"field": "translated_text", "value": "Hallo."})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["new_value"], "Hallo.");
    assert_eq!(change["changed_by"], "alice");

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/v1/sessions/{alice}/entries/{entry_id}/unlock"),
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, lock) = send(
        &app,
        request(
            "GET",
            &format!("/v1/documents/{document_id}/entries/{entry_id}/lock"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(lock.is_null());
}

#[tokio::test]
async fn edit_without_lock_is_a_conflict() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();
    let entry_id = document["entries"][0]["id"].as_str().unwrap();
    let session = open_session(&app, document_id, "alice").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/v1/sessions/{session}/entries/{entry_id}/edit"),
            Some("alice"),
            Some(json!({"field": "notes", "value": "check"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn review_comments_resolve_once() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();
    let entry_id = document["entries"][1]["id"].as_str().unwrap();

    let (status, comment) = send(
        &app,
        request(
            "POST",
            &format!("/v1/documents/{document_id}/comments"),
            Some("reviewer"),
            Some(json!({
                "entry_id": entry_id,
                "comment": "tone is off",
                "suggestion": "use formal register",
                "severity": "warning"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["id"].as_str().unwrap();

    let resolve_uri = format!("/v1/documents/{document_id}/comments/{comment_id}/resolve");
    let (status, resolved) =
        send(&app, request("POST", &resolve_uri, Some("editor"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["is_resolved"], true);
    assert_eq!(resolved["resolved_by"], "editor");

    let (status, body) = send(&app, request("POST", &resolve_uri, Some("editor"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn status_machine_rejects_draft_to_published() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();
    let status_uri = format!("/v1/documents/{document_id}/status");

    let (status, body) = send(
        &app,
        request("POST", &status_uri, Some("owner"), Some(json!({"status": "published"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    for next in ["in_review", "approved", "published"] {
        let (status, body) = send(
            &app,
            request("POST", &status_uri, Some("owner"), Some(json!({"status": next}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], next);
    }
}

#[tokio::test]
async fn versions_diff_and_revert_over_http() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();
    let entry_id = document["entries"][0]["id"].as_str().unwrap();
    let session = open_session(&app, document_id, "alice").await;

    let versions_uri = format!("/v1/documents/{document_id}/versions");
    let (status, v1) = send(
        &app,
        request("POST", &versions_uri, Some("alice"), Some(json!({"label": "v1"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let v1_id = v1["id"].as_str().unwrap();

    for (uri, body) in [
        (format!("/v1/sessions/{session}/entries/{entry_id}/lock"), None),
        (
            format!("/v1/sessions/{session}/entries/{entry_id}/edit"),
            Some(json!({"field": "translated_text", "value": "Hallo."})),
        ),
        (format!("/v1/sessions/{session}/entries/{entry_id}/unlock"), None),
    ] {
        let (status, _) = send(&app, request("POST", &uri, Some("alice"), body)).await;
        assert!(status.is_success(), "{uri} failed with {status}");
    }

    let (status, v2) = send(
        &app,
        request("POST", &versions_uri, Some("alice"), Some(json!({"label": "v2"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let v2_id = v2["id"].as_str().unwrap();

    let (status, changes) = send(
        &app,
        request(
            "GET",
            &format!("/v1/documents/{document_id}/diff?from={v1_id}&to={v2_id}"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let changes = changes.as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["field_name"], "translated_text");

    let (status, reverted) = send(
        &app,
        request(
            "POST",
            &format!("/v1/documents/{document_id}/versions/{v1_id}/revert"),
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reverted["label"], "revert to v1");

    let (status, listed) = send(&app, request("GET", &versions_uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn export_renders_srt() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/v1/documents/{document_id}/export?format=srt"),
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(body.contains("00:00:00,000 --> 00:00:00,900"));

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/v1/documents/{document_id}/export?format=docx"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn events_and_listing_reflect_activity() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();
    open_session(&app, document_id, "alice").await;

    let (status, events) = send(
        &app,
        request(
            "GET",
            &format!("/v1/documents/{document_id}/events?limit=10"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["kind"], "joined");
    assert_eq!(events[0]["seq"], 1);

    let (status, listed) = send(
        &app,
        request("GET", "/v1/documents?project_id=show-1", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["active_sessions"], 1);
    assert_eq!(listed[0]["entry_count"], 2);

    let (status, listed) = send(
        &app,
        request("GET", "/v1/documents?status=approved", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn statistics_and_checkpoint_round_trip() {
    let app = test_app();
    let document = create_document(&app).await;
    let document_id = document["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/v1/documents/{document_id}/checkpoint"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, stats) = send(&app, request("GET", "/v1/statistics", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_documents"], 1);
    assert_eq!(stats["status_counts"]["draft"], 1);
}
