use std::convert::Infallible;

use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cuelab_domain::document::{
    DocumentStatus, DocumentVersion, EditChange, EditDocument, EditSession, EntryField,
    LockHandle, ReviewComment, Severity,
};
use cuelab_domain::editor::{DocumentSummary, EditorStatistics, EntryDraft, NewDocument};
use cuelab_domain::error::DomainError;
use cuelab_domain::events::CollaborationEvent;
use cuelab_domain::export::ExportFormat;
use cuelab_domain::review::NewComment;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use validator::Validate;

use crate::middleware::Identity;
use crate::observability;
use crate::{error::ApiError, middleware as app_middleware, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/documents", post(create_document).get(list_documents))
        .route("/v1/documents/:document_id", get(get_document))
        .route("/v1/documents/:document_id/export", get(export_document))
        .route("/v1/documents/:document_id/sessions", post(open_session))
        .route("/v1/documents/:document_id/comments", post(add_comment))
        .route(
            "/v1/documents/:document_id/comments/:comment_id/resolve",
            post(resolve_comment),
        )
        .route("/v1/documents/:document_id/status", post(set_status))
        .route(
            "/v1/documents/:document_id/versions",
            post(create_version).get(list_versions),
        )
        .route(
            "/v1/documents/:document_id/versions/:version_id/revert",
            post(revert_version),
        )
        .route("/v1/documents/:document_id/diff", get(diff_versions))
        .route("/v1/documents/:document_id/events", get(list_events))
        .route(
            "/v1/documents/:document_id/events/stream",
            get(stream_events),
        )
        .route("/v1/documents/:document_id/checkpoint", post(checkpoint))
        .route(
            "/v1/documents/:document_id/entries/:entry_id/lock",
            get(get_entry_lock),
        )
        .route("/v1/sessions/:session_id/close", post(close_session))
        .route("/v1/sessions/:session_id/heartbeat", post(heartbeat))
        .route(
            "/v1/sessions/:session_id/entries/:entry_id/lock",
            post(lock_entry),
        )
        .route(
            "/v1/sessions/:session_id/entries/:entry_id/unlock",
            post(unlock_entry),
        )
        .route(
            "/v1/sessions/:session_id/entries/:entry_id/edit",
            post(edit_entry),
        )
        .route("/v1/statistics", get(statistics))
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(app_middleware::identity_middleware))
        .with_state(state)
}

fn require_identity(identity: Option<Extension<Identity>>) -> Result<Identity, ApiError> {
    identity
        .map(|Extension(identity)| identity)
        .ok_or(ApiError::Unauthorized)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => body.into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 256))]
    title: String,
    #[validate(length(min = 1, max = 128))]
    project_id: String,
    #[validate(length(min = 2, max = 16))]
    source_language: String,
    #[validate(length(min = 2, max = 16))]
    target_language: String,
    #[serde(default)]
    entries: Vec<EntryDraft>,
}

async fn create_document(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<EditDocument>), ApiError> {
    let identity = require_identity(identity)?;
    validation::validate(&payload)?;
    let document = state
        .editor
        .create_document(NewDocument {
            title: payload.title,
            project_id: payload.project_id,
            source_language: payload.source_language,
            target_language: payload.target_language,
            created_by: identity.user_id,
            entries: payload.entries,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[derive(Debug, Deserialize)]
struct ListDocumentsQuery {
    project_id: Option<String>,
    status: Option<String>,
}

async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<DocumentStatus>)
        .transpose()?;
    let summaries = state
        .editor
        .list_documents(query.project_id.as_deref(), status)
        .await;
    Ok(Json(summaries))
}

async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<EditDocument>, ApiError> {
    Ok(Json(state.editor.document(&document_id).await?))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: String,
}

async fn export_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = query.format.parse()?;
    let body = state.editor.export_document(&document_id, format).await?;
    observability::register_export(&format.to_string());
    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Srt | ExportFormat::Vtt => "text/plain; charset=utf-8",
    };
    Ok(([(axum::http::header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn open_session(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    identity: Option<Extension<Identity>>,
) -> Result<(StatusCode, Json<EditSession>), ApiError> {
    let identity = require_identity(identity)?;
    let session = state
        .editor
        .open_session(&document_id, &identity.user_id, &identity.user_name)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.editor.close_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.editor.heartbeat(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn lock_entry(
    State(state): State<AppState>,
    Path((session_id, entry_id)): Path<(String, String)>,
) -> Result<Json<LockHandle>, ApiError> {
    match state.editor.lock_entry(&session_id, &entry_id).await {
        Ok(handle) => Ok(Json(handle)),
        Err(err) => {
            if let DomainError::AlreadyLocked { .. } = &err {
                observability::register_lock_conflict(&entry_id);
            }
            Err(err.into())
        }
    }
}

async fn unlock_entry(
    State(state): State<AppState>,
    Path((session_id, entry_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.editor.unlock_entry(&session_id, &entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_entry_lock(
    State(state): State<AppState>,
    Path((document_id, entry_id)): Path<(String, String)>,
) -> Result<Json<Option<LockHandle>>, ApiError> {
    Ok(Json(state.editor.entry_lock(&document_id, &entry_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct EditEntryRequest {
    #[validate(length(min = 1, max = 64))]
    field: String,
    value: String,
    comment: Option<String>,
}

async fn edit_entry(
    State(state): State<AppState>,
    Path((session_id, entry_id)): Path<(String, String)>,
    Json(payload): Json<EditEntryRequest>,
) -> Result<Json<EditChange>, ApiError> {
    validation::validate(&payload)?;
    let field: EntryField = payload.field.parse()?;
    let change = state
        .editor
        .edit_entry(&session_id, &entry_id, field, &payload.value, payload.comment)
        .await?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize, Validate)]
struct AddCommentRequest {
    #[validate(length(min = 1, max = 128))]
    entry_id: String,
    #[validate(length(min = 1, max = 4000))]
    comment: String,
    suggestion: Option<String>,
    severity: Severity,
}

async fn add_comment(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    identity: Option<Extension<Identity>>,
    Json(payload): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<ReviewComment>), ApiError> {
    let identity = require_identity(identity)?;
    validation::validate(&payload)?;
    let comment = state
        .editor
        .add_comment(
            &document_id,
            NewComment {
                entry_id: payload.entry_id,
                reviewer_id: identity.user_id,
                reviewer_name: identity.user_name,
                comment: payload.comment,
                suggestion: payload.suggestion,
                severity: payload.severity,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn resolve_comment(
    State(state): State<AppState>,
    Path((document_id, comment_id)): Path<(String, String)>,
    identity: Option<Extension<Identity>>,
) -> Result<Json<ReviewComment>, ApiError> {
    let identity = require_identity(identity)?;
    let comment = state
        .editor
        .resolve_comment(&document_id, &comment_id, &identity.user_id)
        .await?;
    Ok(Json(comment))
}

#[derive(Debug, Deserialize)]
struct SetStatusRequest {
    status: DocumentStatus,
}

#[derive(Serialize)]
struct SetStatusResponse {
    status: DocumentStatus,
}

async fn set_status(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    identity: Option<Extension<Identity>>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<SetStatusResponse>, ApiError> {
    let identity = require_identity(identity)?;
    let status = state
        .editor
        .set_status(&document_id, payload.status, &identity.user_id)
        .await?;
    Ok(Json(SetStatusResponse { status }))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateVersionRequest {
    #[validate(length(min = 1, max = 128))]
    label: String,
}

async fn create_version(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    identity: Option<Extension<Identity>>,
    Json(payload): Json<CreateVersionRequest>,
) -> Result<(StatusCode, Json<DocumentVersion>), ApiError> {
    let identity = require_identity(identity)?;
    validation::validate(&payload)?;
    let version = state
        .editor
        .create_version(&document_id, &payload.label, &identity.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

async fn list_versions(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<Vec<DocumentVersion>>, ApiError> {
    let document = state.editor.document(&document_id).await?;
    Ok(Json(document.versions))
}

async fn revert_version(
    State(state): State<AppState>,
    Path((document_id, version_id)): Path<(String, String)>,
    identity: Option<Extension<Identity>>,
) -> Result<(StatusCode, Json<DocumentVersion>), ApiError> {
    let identity = require_identity(identity)?;
    let version = state
        .editor
        .revert_version(&document_id, &version_id, &identity.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

#[derive(Debug, Deserialize)]
struct DiffQuery {
    from: String,
    to: String,
}

async fn diff_versions(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<Vec<EditChange>>, ApiError> {
    let changes = state
        .editor
        .diff_versions(&document_id, &query.from, &query.to)
        .await?;
    Ok(Json(changes))
}

const DEFAULT_EVENT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn list_events(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<CollaborationEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    let events = state.editor.events(&document_id, limit).await?;
    Ok(Json(events))
}

async fn stream_events(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError> {
    let receiver = state.editor.subscribe(&document_id).await?;
    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        // Lagged receivers skip to the next live event.
        let event = result.ok()?;
        let sse = Event::default().event(event.kind().to_string()).json_data(&event).ok()?;
        Some(Ok::<Event, Infallible>(sse))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

async fn checkpoint(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.editor.checkpoint(&document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn statistics(State(state): State<AppState>) -> Json<EditorStatistics> {
    Json(state.editor.statistics().await)
}
