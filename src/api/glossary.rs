//! Glossary Agent Endpoints
//!
//! Browser-facing surface of the glossary chat agent. The chat route
//! re-streams the upstream SSE body keeping only `message` and
//! `message_end` events; everything else is a status-mirroring
//! passthrough to the agent platform.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::api::{event_stream_response, passthrough, reject_unless_success, upstream_err};
use crate::context::AppContext;
use crate::dify::events::chat::ChatEvent;
use crate::dify::{Attachment, ChatMessageRequest, FileMeta, FileType, ResponseMode};
use crate::stream::forward_events;

const CLIENT_NAME: &str = "glossary";

fn glossary_client(
    ctx: &AppContext,
) -> Result<&crate::dify::ChatClient, (StatusCode, String)> {
    ctx.chat_client(CLIENT_NAME)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

// ============================================================
// Chat
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Think,
    Deepsearch,
}

#[derive(Debug, Deserialize)]
pub struct GlossaryChatRequest {
    pub query: String,
    #[serde(default)]
    pub mode: Option<ChatMode>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub files_meta: Vec<FileMeta>,
}

fn flag(on: bool) -> Value {
    json!(if on { "true" } else { "false" })
}

/// POST /glossary/chat
pub async fn chat(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<GlossaryChatRequest>,
) -> Result<Response, (StatusCode, String)> {
    info!(
        "glossary chat: {} chars, mode {:?}, {} file(s)",
        request.query.len(),
        request.mode,
        request.files_meta.len()
    );

    let mut files = Vec::with_capacity(request.files_meta.len());
    for meta in &request.files_meta {
        let kind = FileType::from_meta(meta).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Invalid file type: {}", meta.name),
            )
        })?;
        files.push(Attachment::local_file(kind, &meta.id));
    }

    let mut inputs = Map::new();
    inputs.insert(
        "thinking".to_string(),
        flag(request.mode == Some(ChatMode::Think)),
    );
    inputs.insert(
        "deepsearch".to_string(),
        flag(request.mode == Some(ChatMode::Deepsearch)),
    );

    let client = glossary_client(&ctx)?;
    let upstream = client
        .create_chat_message(&ChatMessageRequest {
            inputs,
            query: request.query,
            user: ctx.config.server.default_user.clone(),
            response_mode: ResponseMode::Streaming,
            conversation_id: request.conversation_id,
            files,
        })
        .await
        .map_err(upstream_err)?;
    let upstream = reject_unless_success(upstream).await?;

    let stream = forward_events::<ChatEvent, _>(
        upstream,
        |event| matches!(event, ChatEvent::Message(_) | ChatEvent::MessageEnd(_)),
        ctx.config.stream.pacing(),
    );
    Ok(event_stream_response(stream))
}

/// POST /glossary/chat/{task_id}/stop
pub async fn stop_chat(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let client = glossary_client(&ctx)?;
    let resp = client
        .stop_chat_message(&task_id, &ctx.config.server.default_user)
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

// ============================================================
// Files
// ============================================================

/// POST /glossary/upload (multipart: file, user?)
pub async fn upload(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut user: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
                let mime = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                file = Some((name, mime, bytes.to_vec()));
            }
            Some("user") => {
                user = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (name, mime, bytes) =
        file.ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
    let user = user.unwrap_or_else(|| ctx.config.server.default_user.clone());
    info!("glossary upload: {} ({} bytes) for {}", name, bytes.len(), user);

    let client = glossary_client(&ctx)?;
    let resp = client
        .file_upload(&user, &name, bytes, mime.as_deref())
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

/// GET /glossary/file-types
pub async fn file_types() -> Json<Value> {
    let mut table = Map::new();
    for kind in FileType::ALL {
        table.insert(kind.as_str().to_string(), json!(kind.extensions()));
    }
    Json(Value::Object(table))
}

// ============================================================
// Feedback and history
// ============================================================

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub message_id: String,
    pub rating: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// POST /glossary/feedback
pub async fn feedback(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Response, (StatusCode, String)> {
    let client = glossary_client(&ctx)?;
    let resp = client
        .create_feedback(
            &request.message_id,
            &request.rating,
            &ctx.config.server.default_user,
            request.content.as_deref(),
        )
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

#[derive(Debug, Deserialize)]
pub struct ConversationsQuery {
    pub last_id: Option<String>,
    pub limit: Option<u32>,
    pub pinned: Option<bool>,
}

/// GET /glossary/conversations
pub async fn conversations(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Response, (StatusCode, String)> {
    let client = glossary_client(&ctx)?;
    let resp = client
        .conversations(
            &ctx.config.server.default_user,
            query.last_id.as_deref(),
            query.limit,
            query.pinned,
        )
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub first_id: Option<String>,
    pub limit: Option<u32>,
}

/// GET /glossary/conversations/{id}/messages
pub async fn conversation_messages(
    State(ctx): State<Arc<AppContext>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Response, (StatusCode, String)> {
    let client = glossary_client(&ctx)?;
    let resp = client
        .conversation_messages(
            &ctx.config.server.default_user,
            &conversation_id,
            query.first_id.as_deref(),
            query.limit,
        )
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

/// GET /glossary/suggested/{message_id}
pub async fn suggested(
    State(ctx): State<Arc<AppContext>>,
    Path(message_id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let client = glossary_client(&ctx)?;
    let resp = client
        .suggested(&message_id, &ctx.config.server.default_user)
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

// ============================================================
// Audio
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TextToAudioRequest {
    pub text: String,
    #[serde(default)]
    pub streaming: bool,
}

/// POST /glossary/text-to-audio
pub async fn text_to_audio(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<TextToAudioRequest>,
) -> Result<Response, (StatusCode, String)> {
    let client = glossary_client(&ctx)?;
    let resp = client
        .text_to_audio(
            &request.text,
            &ctx.config.server.default_user,
            request.streaming,
        )
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}

/// POST /glossary/audio-to-text (multipart: file)
pub async fn audio_to_text(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let name = field
                .file_name()
                .map(str::to_string)
                .ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
            let mime = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            file = Some((name, mime, bytes.to_vec()));
        }
    }

    let (name, mime, bytes) =
        file.ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
    let client = glossary_client(&ctx)?;
    let resp = client
        .audio_to_text(
            &ctx.config.server.default_user,
            &name,
            bytes,
            mime.as_deref(),
        )
        .await
        .map_err(upstream_err)?;
    passthrough(resp).await
}
