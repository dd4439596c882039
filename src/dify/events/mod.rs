//! Upstream Wire Events
//!
//! The agent platform interleaves heterogeneous SSE sub-events on one
//! stream, discriminated by an `event` tag. Two independent tag spaces
//! exist: the chat family ([`ChatEvent`]) and the workflow family
//! ([`WorkflowEvent`]); both are closed tagged unions so an unknown tag is
//! caught before deserialization and a registered tag with a bad payload
//! is reported separately.

pub mod chat;
pub mod workflow;

pub use chat::ChatEvent;
pub use workflow::WorkflowEvent;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while decoding one wire line into a typed event.
///
/// All three are recoverable at the call site: the re-emitter logs and
/// skips the offending line, the stream continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    #[error("payload does not match schema for `{tag}`: {reason}")]
    SchemaMismatch { tag: String, reason: String },
}

/// Header fields shared by every event variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// One event family: a fixed tag registry plus decode/re-serialize.
pub trait WireEvent: Serialize + DeserializeOwned + Sized {
    /// Whether `tag` belongs to this family's registry.
    fn registered(tag: &str) -> bool;

    /// The wire tag of this event instance.
    fn tag(&self) -> &'static str;

    /// Decode one wire line into a typed event.
    ///
    /// Strips a leading `"data: "` marker if present, parses the JSON
    /// payload, resolves the discriminator against the registry, then
    /// validates the variant payload. Pure function of its input.
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let payload = strip_data_marker(raw);
        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
        let tag = match value.get("event").and_then(serde_json::Value::as_str) {
            Some(tag) => tag.to_string(),
            None => return Err(DecodeError::UnknownEventType("<missing>".to_string())),
        };
        if !Self::registered(&tag) {
            return Err(DecodeError::UnknownEventType(tag));
        }
        serde_json::from_value(value).map_err(|e| DecodeError::SchemaMismatch {
            tag,
            reason: e.to_string(),
        })
    }
}

/// Strip the SSE `data:` marker from a line, if present.
pub fn strip_data_marker(line: &str) -> &str {
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .unwrap_or(line)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_data_marker() {
        assert_eq!(strip_data_marker("data: {\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_data_marker("data:{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_data_marker("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_decode_malformed_payload() {
        let err = ChatEvent::decode("data: {not json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_missing_discriminator() {
        let err = ChatEvent::decode(r#"{"answer": "hi"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventType(tag) if tag == "<missing>"));
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = ChatEvent::decode(r#"{"event": "telemetry"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventType(tag) if tag == "telemetry"));
    }

    #[test]
    fn test_decode_schema_mismatch() {
        // `message` requires an `answer` field.
        let err = ChatEvent::decode(r#"{"event": "message"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::SchemaMismatch { tag, .. } if tag == "message"));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let line = r#"data: {"event": "message", "task_id": "t1", "answer": "Osmosis is..."}"#;
        let first = ChatEvent::decode(line).unwrap();
        let second = ChatEvent::decode(line).unwrap();
        assert_eq!(first, second);
    }
}
