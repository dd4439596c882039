//! Wikipedia Glossary Endpoints
//!
//! One-shot glossary lookups against a configurable OpenAI-compatible
//! provider. An attached image is first described by the provider's
//! vision model and the description is appended to the user prompt.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::api::text_stream_response;
use crate::context::AppContext;
use crate::openai::{answer_stream, CompletionError};

const PROMPT_NAMESPACE: &str = "wikipedia";
const PROMPT_NAME: &str = "glossary";

fn completion_err(e: CompletionError) -> (StatusCode, String) {
    error!("completion call failed: {}", e);
    match e {
        CompletionError::Upstream { status, body } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            body,
        ),
        CompletionError::MissingModel { role } => (
            StatusCode::BAD_REQUEST,
            format!("no {} model configured for this provider", role),
        ),
        other => (StatusCode::BAD_GATEWAY, other.to_string()),
    }
}

/// GET /wikipedia/models: configured roles per provider, absent roles
/// omitted rather than null.
pub async fn models(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let mut providers = Map::new();
    for (name, model) in &ctx.config.wikipedia.models {
        let mut roles = Map::new();
        if let Some(chat) = &model.chat_model {
            roles.insert("chat_model".to_string(), json!(chat));
        }
        if let Some(vision) = &model.image_to_text_model {
            roles.insert("image_to_text_model".to_string(), json!(vision));
        }
        if let Some(reasoner) = &model.reasoner_model {
            roles.insert("reasoner_model".to_string(), json!(reasoner));
        }
        providers.insert(name.clone(), Value::Object(roles));
    }
    Json(Value::Object(providers))
}

#[derive(Debug, Default)]
struct GlossaryForm {
    name: Option<String>,
    model: Option<String>,
    prompt: Option<String>,
    image: Option<(Vec<u8>, String)>,
}

async fn read_form(mut multipart: Multipart) -> Result<GlossaryForm, (StatusCode, String)> {
    let mut form = GlossaryForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        match field.name() {
            Some("name") => {
                form.name = Some(text_field(field).await?);
            }
            Some("model") => {
                form.model = Some(text_field(field).await?);
            }
            Some("prompt") => {
                form.prompt = Some(text_field(field).await?);
            }
            Some("image") => {
                let mime = field
                    .content_type()
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                form.image = Some((bytes.to_vec(), mime));
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
) -> Result<String, (StatusCode, String)> {
    field
        .text()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn require(value: Option<String>, name: &str) -> Result<String, (StatusCode, String)> {
    value.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("missing form field: {}", name),
        )
    })
}

/// POST /wikipedia/glossary (multipart: name, model, prompt, image?)
pub async fn glossary(
    State(ctx): State<Arc<AppContext>>,
    multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let form = read_form(multipart).await?;
    let name = require(form.name, "name")?;
    let model = require(form.model, "model")?;
    let prompt = require(form.prompt, "prompt")?;
    info!(
        "wikipedia glossary: provider {}, model {}, prompt {} chars, image: {}",
        name,
        model,
        prompt.len(),
        form.image.is_some()
    );

    let system_prompt = ctx
        .prompts
        .get(PROMPT_NAMESPACE, PROMPT_NAME)
        .ok_or((StatusCode::NOT_FOUND, "prompt not found".to_string()))?;

    let client = ctx
        .completion_client(&name)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let mut user_content = prompt;
    if let Some((image, mime)) = form.image {
        let description = client
            .image_to_text(&image, &mime)
            .await
            .map_err(completion_err)?;
        user_content = if user_content.is_empty() {
            format!("图片内容：{}", description)
        } else {
            format!("{}\n图片内容：{}", user_content, description)
        };
    }

    let messages = vec![
        json!({"role": "system", "content": system_prompt}),
        json!({"role": "user", "content": user_content}),
    ];
    let upstream = client
        .chat_stream(&model, messages)
        .await
        .map_err(completion_err)?;

    let stream = answer_stream(upstream, ctx.config.stream.wikipedia_pacing());
    Ok(text_stream_response(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_err_mirrors_upstream_status() {
        let (status, body) = completion_err(CompletionError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        });
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, "rate limited");

        let (status, _) = completion_err(CompletionError::MissingModel {
            role: "image_to_text",
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_require_reports_field_name() {
        assert_eq!(require(Some("x".to_string()), "name").unwrap(), "x");
        let (status, body) = require(None, "model").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "missing form field: model");
    }
}
