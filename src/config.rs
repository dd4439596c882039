//! Gateway Configuration
//!
//! Defines the TOML configuration for the gateway:
//! - Server settings (CORS origins, default upstream user)
//! - Outbound proxy
//! - Stream pacing
//! - Agent-platform credentials (`[agents.<name>]`)
//! - Wikipedia providers (`[wikipedia.models.<name>]`)
//!
//! API keys are stored AEAD-sealed; [`GatewayConfig::load`] unwraps them
//! once into memory and rewrites the file when a key gets sealed for the
//! first time.

use crate::crypto::api_key::{unwrap_api_key, ApiKeyCipher, ApiKeyError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors raised while loading configuration or resolving clients
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config file: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no client configured under name `{0}`")]
    UnknownClientName(String),
    #[error("missing required config key: {0}")]
    MissingKey(String),
    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),
    #[error("failed to build http transport: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Complete gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    /// Agent-platform credential sets keyed by logical name (e.g. "glossary")
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    pub wikipedia: WikipediaConfig,
}

/// Server-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,
    /// Upstream `user` identifier attached to agent-platform calls
    pub default_user: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            default_user: "heliannuuthus".to_string(),
        }
    }
}

/// Outbound proxy for upstream calls
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: Option<String>,
}

/// Pacing of re-emitted stream chunks.
///
/// The delay between yields is a transport-pacing control, not a
/// correctness requirement; zero disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Delay between glossary SSE chunks, in milliseconds
    pub pacing_ms: u64,
    /// Delay between wikipedia token chunks, in milliseconds
    pub wikipedia_pacing_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 100,
            wikipedia_pacing_ms: 10,
        }
    }
}

impl StreamConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn wikipedia_pacing(&self) -> Duration {
        Duration::from_millis(self.wikipedia_pacing_ms)
    }
}

/// One agent-platform credential set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// AEAD-sealed at rest; plaintext only in `api_key_plaintext`
    pub api_key: String,
    #[serde(default = "default_agent_endpoint")]
    pub api_endpoint: String,
    #[serde(skip)]
    pub api_key_plaintext: Option<String>,
}

fn default_agent_endpoint() -> String {
    "https://api.dify.ai/v1".to_string()
}

/// Wikipedia feature configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikipediaConfig {
    /// OpenAI-compatible providers keyed by logical name
    pub models: HashMap<String, ModelConfig>,
}

/// One OpenAI-compatible provider credential set with per-role model ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// AEAD-sealed at rest; plaintext only in `api_key_plaintext`
    pub api_key: String,
    pub api_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_to_text_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoner_model: Option<String>,
    #[serde(skip)]
    pub api_key_plaintext: Option<String>,
}

impl GatewayConfig {
    /// Parse a config file without touching the API keys. Used by tests and
    /// by [`GatewayConfig::load`].
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load the config file and unwrap every API key exactly once.
    ///
    /// Keys found unsealed (marked `plaintext(...)`, or any key on a
    /// fresh-DEK first run) are sealed and the config file is rewritten;
    /// a freshly generated DEK/nonce pair is persisted to `env_path`.
    pub fn load(config_path: &Path, env_path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
            path: config_path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&raw)?;

        let cipher = ApiKeyCipher::load_or_generate(env_path)?;
        let rewrote = config.unwrap_keys(&cipher)?;

        if rewrote {
            let out = toml::to_string_pretty(&config)?;
            std::fs::write(config_path, out).map_err(|source| ConfigError::Io {
                path: config_path.display().to_string(),
                source,
            })?;
            info!("rewrote {} with sealed API keys", config_path.display());
        }
        if cipher.is_fresh() {
            cipher.persist_to_env_file(env_path)?;
        }
        Ok(config)
    }

    /// Unwrap all API keys in place; returns true if any stored key was
    /// sealed (i.e. the config needs to be written back).
    pub fn unwrap_keys(&mut self, cipher: &ApiKeyCipher) -> Result<bool, ApiKeyError> {
        let mut rewrote = false;
        for (name, agent) in self.agents.iter_mut() {
            let (plaintext, resealed) = unwrap_api_key(cipher, &mut agent.api_key)?;
            agent.api_key_plaintext = Some(plaintext);
            rewrote |= resealed;
            info!("unwrapped API key for agent `{}`", name);
        }
        for (name, model) in self.wikipedia.models.iter_mut() {
            let (plaintext, resealed) = unwrap_api_key(cipher, &mut model.api_key)?;
            model.api_key_plaintext = Some(plaintext);
            rewrote |= resealed;
            info!("unwrapped API key for wikipedia provider `{}`", name);
        }
        Ok(rewrote)
    }

    pub fn agent(&self, name: &str) -> Result<&AgentConfig, ConfigError> {
        self.agents
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClientName(name.to_string()))
    }

    pub fn wikipedia_model(&self, name: &str) -> Result<&ModelConfig, ConfigError> {
        self.wikipedia
            .models
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClientName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
allowed_origins = ["http://localhost:3000"]
default_user = "tester"

[proxy]
url = "http://127.0.0.1:7890"

[agents.glossary]
api_key = "plaintext(app-glossary-key)"

[wikipedia.models.deepseek]
api_key = "plaintext(sk-wiki-key)"
api_endpoint = "https://api.deepseek.com/v1"
chat_model = "deepseek-chat"
reasoner_model = "deepseek-reasoner"
"#;

    #[test]
    fn test_parse_sample() {
        let config = GatewayConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.server.default_user, "tester");
        assert_eq!(
            config.proxy.url.as_deref(),
            Some("http://127.0.0.1:7890")
        );
        assert_eq!(config.stream.pacing_ms, 100);
        let agent = config.agent("glossary").unwrap();
        assert_eq!(agent.api_endpoint, "https://api.dify.ai/v1");
        let model = config.wikipedia_model("deepseek").unwrap();
        assert_eq!(model.chat_model.as_deref(), Some("deepseek-chat"));
        assert!(model.image_to_text_model.is_none());
    }

    #[test]
    fn test_unknown_client_name() {
        let config = GatewayConfig::parse(SAMPLE).unwrap();
        assert!(matches!(
            config.agent("nope"),
            Err(ConfigError::UnknownClientName(name)) if name == "nope"
        ));
        assert!(config.wikipedia_model("nope").is_err());
    }

    #[test]
    fn test_unwrap_keys_seals_marked_plaintext() {
        let mut config = GatewayConfig::parse(SAMPLE).unwrap();
        let cipher = ApiKeyCipher::generate();
        let rewrote = config.unwrap_keys(&cipher).unwrap();
        assert!(rewrote);

        let agent = config.agent("glossary").unwrap();
        assert_eq!(agent.api_key_plaintext.as_deref(), Some("app-glossary-key"));
        assert!(!agent.api_key.contains("app-glossary-key"));
        assert_eq!(cipher.open(&agent.api_key).unwrap(), "app-glossary-key");
    }

    #[test]
    fn test_load_rewrites_file_and_persists_dek() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let env_path = dir.path().join(".env");
        std::fs::write(&config_path, SAMPLE).unwrap();

        let config = GatewayConfig::load(&config_path, &env_path).unwrap();
        assert_eq!(
            config
                .agent("glossary")
                .unwrap()
                .api_key_plaintext
                .as_deref(),
            Some("app-glossary-key")
        );

        // Config on disk no longer carries plaintext; env file has the DEK.
        let on_disk = std::fs::read_to_string(&config_path).unwrap();
        assert!(!on_disk.contains("app-glossary-key"));
        assert!(std::fs::read_to_string(&env_path)
            .unwrap()
            .contains("API_KEY_DEK"));

        // A second load round-trips through the sealed form.
        let reloaded = GatewayConfig::load(&config_path, &env_path).unwrap();
        assert_eq!(
            reloaded
                .wikipedia_model("deepseek")
                .unwrap()
                .api_key_plaintext
                .as_deref(),
            Some("sk-wiki-key")
        );
    }

    #[test]
    fn test_plaintext_field_never_serialized() {
        let mut config = GatewayConfig::parse(SAMPLE).unwrap();
        config.unwrap_keys(&ApiKeyCipher::generate()).unwrap();
        let out = toml::to_string_pretty(&config).unwrap();
        assert!(!out.contains("app-glossary-key"));
        assert!(!out.contains("sk-wiki-key"));
        assert!(!out.contains("api_key_plaintext"));
    }
}
