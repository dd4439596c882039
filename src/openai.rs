//! OpenAI-Compatible Completion Client
//!
//! Talks to any `/chat/completions` endpoint speaking the OpenAI wire
//! format. Two call shapes:
//!
//! - `chat_stream`: streaming completions, decoded chunk-by-chunk by
//!   [`answer_stream`] into plain text pieces
//! - `image_to_text`: one blocking vision call that describes an image
//!
//! Reasoner models interleave `reasoning_content` before `content`; the
//! answer stream marks the switch with a literal `</think>` so clients can
//! split thinking from the final answer.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::dify::client::CONNECT_RETRIES;

const IMAGE_DESCRIPTION_PROMPT: &str = "请描述这张图片的内容";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("no {role} model configured for this provider")]
    MissingModel { role: &'static str },
    #[error("completion response contained no choices")]
    EmptyResponse,
}

/// Client for one OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    image_to_text_model: Option<String>,
}

impl CompletionClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        image_to_text_model: Option<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            image_to_text_model,
        }
    }

    /// POST /chat/completions with connection-level retry, same contract as
    /// the agent-platform client. Non-2xx statuses are surfaced by callers.
    async fn post_completion(&self, body: &Value) -> Result<Response, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt = 0u32;
        loop {
            let result = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;
            match result {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_connect() && attempt + 1 < CONNECT_RETRIES => {
                    attempt += 1;
                    warn!("connect to {} failed (attempt {}): {}", url, attempt, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start a streaming completion. The returned response body is the raw
    /// SSE stream; feed it to [`answer_stream`].
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<Value>,
    ) -> Result<Response, CompletionError> {
        let resp = self
            .post_completion(&json!({
                "model": model,
                "messages": messages,
                "temperature": 0.7,
                "max_tokens": 4096,
                "stream": true,
            }))
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Upstream { status, body });
        }
        Ok(resp)
    }

    /// Describe an image with the vision model. Blocking call, returns the
    /// description text.
    pub async fn image_to_text(&self, image: &[u8], mime_type: &str) -> Result<String, CompletionError> {
        let model = self
            .image_to_text_model
            .as_deref()
            .ok_or(CompletionError::MissingModel {
                role: "image_to_text",
            })?;
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(image));
        let resp = self
            .post_completion(&json!({
                "model": model,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": IMAGE_DESCRIPTION_PROMPT},
                        {"type": "image_url", "image_url": {"url": data_url}},
                    ],
                }],
                "max_tokens": 500,
            }))
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Upstream { status, body });
        }
        let completion: ChatCompletion = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

/// One decoded streaming chunk
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

struct AnswerState<S> {
    lines: S,
    pacing: Duration,
    // false while reasoning chunks are in flight
    is_answer: bool,
    yielded_any: bool,
}

/// Turn a streaming completion response into plain text pieces.
///
/// Reasoning chunks pass through as-is; the first answer chunk after a
/// reasoning run is prefixed with `</think>`. The `[DONE]` sentinel ends
/// the stream. Each piece after the first is delayed by `pacing`.
pub fn answer_stream(
    resp: Response,
    pacing: Duration,
) -> impl Stream<Item = String> + Send {
    let lines = crate::stream::data_lines(resp).boxed();
    let state = AnswerState {
        lines,
        pacing,
        is_answer: true,
        yielded_any: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            let payload = state.lines.next().await?;
            if payload == "[DONE]" {
                return None;
            }
            let chunk: ChatCompletionChunk = match serde_json::from_str(&payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("skipping undecodable completion chunk: {}", e);
                    continue;
                }
            };
            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };
            let piece = match (choice.delta.content, choice.delta.reasoning_content) {
                (Some(content), _) if !content.is_empty() => {
                    if state.is_answer {
                        content
                    } else {
                        state.is_answer = true;
                        format!("</think>{}", content)
                    }
                }
                (_, Some(reasoning)) if !reasoning.is_empty() => {
                    state.is_answer = false;
                    reasoning
                }
                _ => continue,
            };
            if state.yielded_any {
                tokio::time::sleep(state.pacing).await;
            }
            state.yielded_any = true;
            return Some((piece, state));
        }
    })
}
