//! Cryptographic utilities for API keys at rest.

pub mod api_key;

pub use api_key::{ApiKeyCipher, ApiKeyError, NONCE_SIZE};
