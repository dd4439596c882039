//! Glossary Gateway
//!
//! Backend proxy for two LLM-backed features:
//! - `/glossary/*`: conversational glossary agent backed by a Dify-style
//!   agent-chat platform (REST + SSE), re-streamed to the browser as
//!   server-sent events
//! - `/wikipedia/*`: wikipedia glossary lookup backed by an OpenAI-compatible
//!   chat-completion API, re-streamed token by token
//!
//! ## Module Structure
//!
//! - `config`: TOML configuration and the startup API-key unwrap pipeline
//! - `crypto`: AEAD sealing of API keys at rest
//! - `context`: application context (shared transport + upstream client pool)
//! - `dify`: agent-platform client, wire events, file metadata
//! - `openai`: OpenAI-compatible completion client and token stream
//! - `stream`: SSE line assembly and re-emission
//! - `prompts`: prompt template lookup
//! - `api`: HTTP route handlers
//! - `server`: router assembly and startup

pub mod api;
pub mod config;
pub mod context;
pub mod crypto;
pub mod dify;
pub mod openai;
pub mod prompts;
pub mod server;
pub mod stream;

pub use config::{ConfigError, GatewayConfig};
pub use context::AppContext;
pub use server::{build_router, run_server};
