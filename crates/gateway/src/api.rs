//! REST API routes.
//!
//! - `POST /api/chat`                          — blocking chat turn
//! - `POST /api/chat/stream`                   — SSE streamed chat turn
//! - `GET/POST /api/sessions`                  — list / create sessions
//! - `GET /api/sessions/{id}`                  — session details
//! - `GET /api/sessions/{id}/messages`         — message history
//! - `PATCH /api/sessions/{id}`                — update metadata
//! - `DELETE /api/sessions/{id}`               — delete (cascades)
//! - `POST /api/sessions/{id}/generate-title`  — AI-assisted title

use crate::SharedState;
use agrocert_agent::engine::ToolInvocation;
use agrocert_agent::ChatStreamEvent;
use agrocert_core::error::AgentError;
use agrocert_core::session::{Session, WorkflowMode};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};
use uuid::Uuid;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}", axum::routing::patch(update_session_handler))
        .route("/sessions/{id}", axum::routing::delete(delete_session_handler))
        .route("/sessions/{id}/messages", get(session_messages_handler))
        .route("/sessions/{id}/generate-title", post(generate_title_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn map_error(e: AgentError) -> ApiError {
    let status = match &e {
        AgentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn parse_workflow_mode(raw: Option<&str>) -> Result<Option<WorkflowMode>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => WorkflowMode::parse(s).map(Some).ok_or_else(|| {
            bad_request(format!(
                "Unknown workflow_mode '{s}'. Valid modes: {}",
                WorkflowMode::ALL
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }),
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    session_id: Uuid,
}

#[derive(Serialize)]
struct ChatResponse {
    message: String,
    session_id: Uuid,
    user_message_id: Uuid,
    assistant_message_id: Uuid,
    tool_calls: Vec<ToolInvocation>,
}

#[derive(Serialize)]
struct SessionDto {
    id: Uuid,
    user_id: Uuid,
    application_id: Option<Uuid>,
    workflow_mode: Option<WorkflowMode>,
    title: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Session> for SessionDto {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            application_id: s.application_id,
            workflow_mode: s.workflow_mode,
            title: s.title,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    user_id: Uuid,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    application_id: Option<Uuid>,
    #[serde(default)]
    workflow_mode: Option<String>,
}

#[derive(Deserialize)]
struct ListSessionsQuery {
    user_id: Uuid,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionDto>,
    total: i64,
}

#[derive(Deserialize)]
struct MessagesQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

#[derive(Serialize)]
struct MessageDto {
    id: Uuid,
    role: String,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct SessionMessagesResponse {
    session_id: Uuid,
    messages: Vec<MessageDto>,
    count: usize,
}

#[derive(Deserialize)]
struct UpdateSessionRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    workflow_mode: Option<String>,
}

#[derive(Deserialize)]
struct GenerateTitleRequest {
    user_message: String,
    assistant_response: String,
}

#[derive(Serialize)]
struct GenerateTitleResponse {
    session_id: Uuid,
    title: String,
    generated: bool,
}

// ── Chat ──────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    info!(session_id = %payload.session_id, "Chat request");

    let outcome = state
        .service
        .chat(payload.session_id, &payload.message)
        .await
        .map_err(map_error)?;

    Ok(Json(ChatResponse {
        message: outcome.reply,
        session_id: outcome.session_id,
        user_message_id: outcome.user_message_id,
        assistant_message_id: outcome.assistant_message_id,
        tool_calls: outcome.tool_calls,
    }))
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if payload.message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    info!(session_id = %payload.session_id, "Streaming chat request");

    let rx = state
        .service
        .clone()
        .stream_chat(payload.session_id, payload.message)
        .await
        .map_err(map_error)?;

    let stream = ReceiverStream::new(rx).map(|event: ChatStreamEvent| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream))
}

// ── Sessions ──────────────────────────────────────────────────────────────

async fn list_sessions_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let page = state
        .service
        .list_sessions(query.user_id, limit, query.offset.max(0))
        .await
        .map_err(map_error)?;

    Ok(Json(SessionListResponse {
        sessions: page.sessions.into_iter().map(SessionDto::from).collect(),
        total: page.total,
    }))
}

async fn create_session_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionDto>), ApiError> {
    let workflow_mode = parse_workflow_mode(payload.workflow_mode.as_deref())?;
    let title = payload
        .title
        .unwrap_or_else(|| agrocert_core::session::DEFAULT_SESSION_TITLE.to_string());

    let session = state
        .service
        .create_session(payload.user_id, &title, payload.application_id, workflow_mode)
        .await
        .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDto>, ApiError> {
    let session = state.service.get_session(id).await.map_err(map_error)?;
    Ok(Json(session.into()))
}

async fn session_messages_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<SessionMessagesResponse>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let messages = state
        .service
        .session_messages(id, limit)
        .await
        .map_err(map_error)?;

    let messages: Vec<MessageDto> = messages
        .into_iter()
        .map(|m| MessageDto {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(SessionMessagesResponse {
        session_id: id,
        count: messages.len(),
        messages,
    }))
}

async fn update_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<Json<SessionDto>, ApiError> {
    let workflow_mode = parse_workflow_mode(payload.workflow_mode.as_deref())?;

    let session = state
        .service
        .update_session(id, payload.title.as_deref(), workflow_mode)
        .await
        .map_err(map_error)?;

    Ok(Json(session.into()))
}

async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_session(id).await.map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate_title_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GenerateTitleRequest>,
) -> Result<Json<GenerateTitleResponse>, ApiError> {
    if payload.user_message.is_empty() || payload.assistant_response.is_empty() {
        return Err(bad_request(
            "user_message and assistant_response must not be empty",
        ));
    }

    let outcome = state
        .service
        .generate_session_title(id, &payload.user_message, &payload.assistant_response)
        .await
        .map_err(map_error)?;

    Ok(Json(GenerateTitleResponse {
        session_id: outcome.session_id,
        title: outcome.title,
        generated: outcome.generated,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::GatewayState;
    use agrocert_agent::{ChatService, ChatSettings};
    use agrocert_core::chat::ChatMessage;
    use agrocert_core::error::ProviderError;
    use agrocert_core::memory::NoopMemory;
    use agrocert_core::provider::{Provider, ProviderReply, ProviderRequest, StopReason};
    use agrocert_core::store::Store;
    use agrocert_core::tool::ToolRegistry;
    use agrocert_store::MemStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderReply, ProviderError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ProviderReply {
                message: ChatMessage::assistant(format!("echo: {last}")),
                stop_reason: Some(StopReason::EndTurn),
                usage: None,
                model: "echo".into(),
            })
        }
    }

    pub(crate) async fn test_state() -> crate::SharedState {
        test_state_with_store().await.0
    }

    pub(crate) async fn test_state_with_store() -> (crate::SharedState, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let service = Arc::new(ChatService::new(
            store.clone(),
            Arc::new(EchoProvider),
            Arc::new(ToolRegistry::new()),
            Arc::new(NoopMemory),
            ChatSettings::default(),
        ));
        (Arc::new(GatewayState { service }), store)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn session_create_and_get() {
        let (state, _store) = test_state_with_store().await;
        let app = api_router(state);
        let user_id = Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/sessions",
                serde_json::json!({
                    "user_id": user_id,
                    "workflow_mode": "document_review"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let created = body_json(response).await;
        assert_eq!(created["workflow_mode"], "document_review");
        assert_eq!(created["title"], "New Conversation");

        let session_id = created["id"].as_str().unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_workflow_mode_is_bad_request() {
        let (state, _store) = test_state_with_store().await;
        let app = api_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/sessions",
                serde_json::json!({
                    "user_id": Uuid::new_v4(),
                    "workflow_mode": "chaos_mode"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_round_trip() {
        let (state, store) = test_state_with_store().await;
        let session = store
            .create_session(Uuid::new_v4(), "New Conversation", None, None)
            .await
            .unwrap();
        let app = api_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                serde_json::json!({
                    "message": "hello",
                    "session_id": session.id
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "echo: hello");
        assert!(body["user_message_id"].is_string());
        assert!(body["assistant_message_id"].is_string());
    }

    #[tokio::test]
    async fn chat_unknown_session_is_404() {
        let (state, _store) = test_state_with_store().await;
        let app = api_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                serde_json::json!({
                    "message": "hello",
                    "session_id": Uuid::new_v4()
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_empty_message_is_bad_request() {
        let (state, _store) = test_state_with_store().await;
        let app = api_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                serde_json::json!({
                    "message": "",
                    "session_id": Uuid::new_v4()
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stream_endpoint_is_event_stream() {
        let (state, store) = test_state_with_store().await;
        let session = store
            .create_session(Uuid::new_v4(), "New Conversation", None, None)
            .await
            .unwrap();
        let app = api_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat/stream",
                serde_json::json!({
                    "message": "stream please",
                    "session_id": session.id
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("event: message_start"));
        assert!(body.contains("event: token"));
        assert!(body.contains("event: complete"));
    }

    #[tokio::test]
    async fn messages_listing_and_delete() {
        let (state, store) = test_state_with_store().await;
        let session = store
            .create_session(Uuid::new_v4(), "New Conversation", None, None)
            .await
            .unwrap();
        store
            .append_message(session.id, "user", "q")
            .await
            .unwrap();
        store
            .append_message(session.id, "assistant", "a")
            .await
            .unwrap();
        let app = api_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/messages", session.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 2);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/sessions/{}", session.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Gone now
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}", session.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generate_title_applies_to_default_session() {
        let (state, store) = test_state_with_store().await;
        let session = store
            .create_session(Uuid::new_v4(), "New Conversation", None, None)
            .await
            .unwrap();
        let app = api_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{}/generate-title", session.id),
                serde_json::json!({
                    "user_message": "Help with my organic certification",
                    "assistant_response": "Of course!"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["generated"], true);
        assert!(!body["title"].as_str().unwrap().is_empty());
    }
}
