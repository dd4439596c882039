//! Encrypted API Key Handling
//!
//! Upstream API keys live in the config file as AEAD ciphertext
//! (ChaCha20-Poly1305, base64). At startup each key is unwrapped exactly
//! once into process memory; the plaintext never goes back to disk.
//!
//! The data-encryption key (DEK) and nonce are persisted base64-encoded to
//! an env file (`API_KEY_DEK` / `API_KEY_NONCE`) on first run. A stored
//! value wrapped in `plaintext(...)` is treated as a not-yet-sealed key:
//! the first unwrap seals it for storage and returns the enclosed plaintext.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Nonce size for ChaCha20-Poly1305 (96 bits)
pub const NONCE_SIZE: usize = 12;

const DEK_VAR: &str = "API_KEY_DEK";
const NONCE_VAR: &str = "API_KEY_NONCE";

/// Errors during API key sealing/unsealing
#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("env file error: {0}")]
    EnvFile(#[from] std::io::Error),
}

/// Process-wide data-encryption key for API keys at rest.
///
/// `fresh` records whether the DEK was generated on this startup (no env
/// file entry yet); in that case stored keys are assumed to still be
/// plaintext and get sealed on first unwrap.
#[derive(Clone)]
pub struct ApiKeyCipher {
    dek: [u8; 32],
    nonce: [u8; NONCE_SIZE],
    fresh: bool,
}

impl ApiKeyCipher {
    /// Generate a new random DEK and nonce.
    pub fn generate() -> Self {
        let mut dek = [0u8; 32];
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut dek);
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            dek,
            nonce,
            fresh: true,
        }
    }

    /// Build a cipher from base64-encoded DEK and nonce.
    pub fn from_base64(dek_b64: &str, nonce_b64: &str) -> Result<Self, ApiKeyError> {
        let dek: [u8; 32] = BASE64
            .decode(dek_b64)
            .map_err(|e| ApiKeyError::InvalidKeyMaterial(format!("bad DEK base64: {}", e)))?
            .try_into()
            .map_err(|_| ApiKeyError::InvalidKeyMaterial("DEK must be 32 bytes".to_string()))?;
        let nonce: [u8; NONCE_SIZE] = BASE64
            .decode(nonce_b64)
            .map_err(|e| ApiKeyError::InvalidKeyMaterial(format!("bad nonce base64: {}", e)))?
            .try_into()
            .map_err(|_| ApiKeyError::InvalidKeyMaterial("nonce must be 12 bytes".to_string()))?;
        Ok(Self {
            dek,
            nonce,
            fresh: false,
        })
    }

    /// Load the DEK/nonce from the env file (or process environment), or
    /// generate a fresh pair if neither holds one.
    pub fn load_or_generate(env_path: &Path) -> Result<Self, ApiKeyError> {
        let mut vars = read_env_file(env_path)?;
        for var in [DEK_VAR, NONCE_VAR] {
            if let Ok(v) = std::env::var(var) {
                vars.entry(var.to_string()).or_insert(v);
            }
        }
        match (vars.get(DEK_VAR), vars.get(NONCE_VAR)) {
            (Some(dek), Some(nonce)) => {
                info!("loaded API key DEK from {}", env_path.display());
                Self::from_base64(dek, nonce)
            }
            _ => {
                info!("no API key DEK found, generating a new one");
                Ok(Self::generate())
            }
        }
    }

    /// True if the DEK was generated on this startup and is not yet persisted.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Seal a plaintext API key, returning base64 ciphertext.
    pub fn seal(&self, plaintext: &str) -> Result<String, ApiKeyError> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.dek)
            .map_err(|e| ApiKeyError::EncryptionFailed(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&self.nonce), plaintext.as_bytes())
            .map_err(|e| ApiKeyError::EncryptionFailed(e.to_string()))?;
        Ok(BASE64.encode(ciphertext))
    }

    /// Open a base64 ciphertext back into the plaintext API key.
    pub fn open(&self, ciphertext_b64: &str) -> Result<String, ApiKeyError> {
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| ApiKeyError::DecryptionFailed(format!("bad ciphertext base64: {}", e)))?;
        let cipher = ChaCha20Poly1305::new_from_slice(&self.dek)
            .map_err(|e| ApiKeyError::DecryptionFailed(e.to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext.as_ref())
            .map_err(|_| ApiKeyError::DecryptionFailed("authentication failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|e| ApiKeyError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
    }

    /// Persist the DEK/nonce to the env file, preserving unrelated entries.
    pub fn persist_to_env_file(&self, env_path: &Path) -> Result<(), ApiKeyError> {
        let mut vars = read_env_file(env_path)?;
        vars.insert(DEK_VAR.to_string(), BASE64.encode(self.dek));
        vars.insert(NONCE_VAR.to_string(), BASE64.encode(self.nonce));
        let mut keys: Vec<&String> = vars.keys().collect();
        keys.sort();
        let mut out = String::new();
        for k in keys {
            out.push_str(&format!("{}=\"{}\"\n", k, vars[k]));
        }
        std::fs::write(env_path, out)?;
        info!("persisted API key DEK to {}", env_path.display());
        Ok(())
    }
}

/// Unwrap one stored API key.
///
/// Returns the plaintext and rewrites `stored` to ciphertext when the value
/// was not sealed yet (a `plaintext(...)`-marked key, or any key on a
/// fresh-DEK first run). The caller is responsible for writing the mutated
/// config back to disk.
pub fn unwrap_api_key(
    cipher: &ApiKeyCipher,
    stored: &mut String,
) -> Result<(String, bool), ApiKeyError> {
    if let Some(inner) = strip_plaintext_marker(stored) {
        let plaintext = inner.to_string();
        *stored = cipher.seal(&plaintext)?;
        return Ok((plaintext, true));
    }
    if cipher.is_fresh() {
        let plaintext = stored.clone();
        *stored = cipher.seal(&plaintext)?;
        return Ok((plaintext, true));
    }
    Ok((cipher.open(stored)?, false))
}

fn strip_plaintext_marker(value: &str) -> Option<&str> {
    value.strip_prefix("plaintext(")?.strip_suffix(')')
}

/// Parse a `KEY="value"` env file into a map. Missing file is an empty map.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ApiKeyError> {
    let mut vars = HashMap::new();
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vars),
        Err(e) => return Err(e.into()),
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(vars)
}
