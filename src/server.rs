//! Gateway Server
//!
//! Route table and startup:
//!
//! ```text
//! /glossary/*   Agent-platform chat, files, history, audio
//! /wikipedia/*  OpenAI-compatible glossary lookup
//! /health       Liveness probe
//! ```
//!
//! CORS is restricted to the configured origins with credentials allowed,
//! so origins and methods are listed explicitly (wildcards and
//! credentials are mutually exclusive in tower-http).

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{glossary, wikipedia};
use crate::context::AppContext;

pub async fn health_check() -> &'static str {
    "OK"
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring unparseable CORS origin: {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.config.server.allowed_origins);
    Router::new()
        .route("/health", get(health_check))
        // Glossary agent
        .route("/glossary/chat", post(glossary::chat))
        .route("/glossary/chat/:task_id/stop", post(glossary::stop_chat))
        .route("/glossary/upload", post(glossary::upload))
        .route("/glossary/file-types", get(glossary::file_types))
        .route("/glossary/feedback", post(glossary::feedback))
        .route("/glossary/conversations", get(glossary::conversations))
        .route(
            "/glossary/conversations/:id/messages",
            get(glossary::conversation_messages),
        )
        .route(
            "/glossary/suggested/:message_id",
            get(glossary::suggested),
        )
        .route("/glossary/text-to-audio", post(glossary::text_to_audio))
        .route("/glossary/audio-to-text", post(glossary::audio_to_text))
        // Wikipedia glossary
        .route("/wikipedia/models", get(wikipedia::models))
        .route("/wikipedia/glossary", post(wikipedia::glossary))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

pub async fn run_server(ctx: Arc<AppContext>, host: &str, port: u16) -> anyhow::Result<()> {
    let agents = ctx.config.agents.len();
    let providers = ctx.config.wikipedia.models.len();
    let app = build_router(ctx);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                      Glossary Gateway                        ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Listening on: {:44} ║", addr);
    info!("║  Agents:       {:<44} ║", agents);
    info!("║  Providers:    {:<44} ║", providers);
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Endpoints:                                                  ║");
    info!("║    GET  /health              - Health check                  ║");
    info!("║    POST /glossary/chat       - Agent chat (SSE)              ║");
    info!("║    POST /glossary/upload     - File upload                   ║");
    info!("║    GET  /glossary/*          - Conversations, suggestions    ║");
    info!("║    POST /wikipedia/glossary  - Glossary lookup (stream)      ║");
    info!("║    GET  /wikipedia/models    - Provider model roles          ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    axum::serve(listener, app).await?;

    Ok(())
}
