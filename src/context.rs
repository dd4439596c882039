//! Application Context
//!
//! All shared state is built eagerly at startup and handed to handlers
//! through axum's `State`. Upstream clients share one pooled transport;
//! a misconfigured credential fails `new` instead of the first request.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, Proxy};
use tracing::info;

use crate::config::{ConfigError, GatewayConfig};
use crate::dify::{ChatClient, DifyClient};
use crate::openai::CompletionClient;
use crate::prompts::PromptStore;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AppContext {
    pub config: GatewayConfig,
    pub prompts: PromptStore,
    chat_clients: HashMap<String, ChatClient>,
    completion_clients: HashMap<String, CompletionClient>,
}

impl AppContext {
    /// Build shared state from an unwrapped config. Requires every API key
    /// to have been unwrapped already (as [`GatewayConfig::load`] does).
    pub fn new(
        config: GatewayConfig,
        prompts_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().timeout(UPSTREAM_TIMEOUT);
        if let Some(url) = &config.proxy.url {
            info!("routing upstream calls through proxy {}", url);
            builder = builder.proxy(Proxy::all(url)?);
        }
        let http = builder.build()?;

        let mut chat_clients = HashMap::new();
        for (name, agent) in &config.agents {
            let api_key = agent.api_key_plaintext.clone().ok_or_else(|| {
                ConfigError::MissingKey(format!("agents.{}.api_key", name))
            })?;
            chat_clients.insert(
                name.clone(),
                ChatClient::new(DifyClient::new(http.clone(), &agent.api_endpoint, api_key)),
            );
            info!("agent client `{}` -> {}", name, agent.api_endpoint);
        }

        let mut completion_clients = HashMap::new();
        for (name, model) in &config.wikipedia.models {
            let api_key = model.api_key_plaintext.clone().ok_or_else(|| {
                ConfigError::MissingKey(format!("wikipedia.models.{}.api_key", name))
            })?;
            completion_clients.insert(
                name.clone(),
                CompletionClient::new(
                    http.clone(),
                    &model.api_endpoint,
                    api_key,
                    model.image_to_text_model.clone(),
                ),
            );
            info!("wikipedia provider `{}` -> {}", name, model.api_endpoint);
        }

        Ok(Self {
            config,
            prompts: PromptStore::new(prompts_dir),
            chat_clients,
            completion_clients,
        })
    }

    pub fn chat_client(&self, name: &str) -> Result<&ChatClient, ConfigError> {
        self.chat_clients
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClientName(name.to_string()))
    }

    pub fn completion_client(&self, name: &str) -> Result<&CompletionClient, ConfigError> {
        self.completion_clients
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClientName(name.to_string()))
    }
}
