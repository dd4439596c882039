//! Chat-family wire events (`/chat-messages` streams).

use super::{EventHeader, WireEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One chat-stream sub-event, discriminated by the wire `event` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    Message(MessageEvent),
    AgentMessage(AgentMessageEvent),
    AgentThought(AgentThoughtEvent),
    MessageFile(MessageFileEvent),
    MessageEnd(MessageEndEvent),
    TtsMessage(TtsMessageEvent),
    TtsMessageEnd(TtsMessageEndEvent),
    MessageReplace(MessageReplaceEvent),
    Error(ErrorEvent),
    Ping(PingEvent),
}

impl ChatEvent {
    pub const TAGS: &'static [&'static str] = &[
        "message",
        "agent_message",
        "agent_thought",
        "message_file",
        "message_end",
        "tts_message",
        "tts_message_end",
        "message_replace",
        "error",
        "ping",
    ];
}

impl WireEvent for ChatEvent {
    fn registered(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::AgentMessage(_) => "agent_message",
            Self::AgentThought(_) => "agent_thought",
            Self::MessageFile(_) => "message_file",
            Self::MessageEnd(_) => "message_end",
            Self::TtsMessage(_) => "tts_message",
            Self::TtsMessageEnd(_) => "tts_message_end",
            Self::MessageReplace(_) => "message_replace",
            Self::Error(_) => "error",
            Self::Ping(_) => "ping",
        }
    }
}

/// Answer text delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessageEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub answer: String,
}

/// Intermediate agent reasoning step; not forwarded to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentThoughtEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub id: String,
    pub position: i64,
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_files: Option<Vec<Map<String, Value>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFileEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub belongs_to: String,
    pub url: String,
}

/// Terminal event carrying usage/retrieval metadata.
///
/// The metadata object is forwarded opaquely; [`MessageEndEvent::usage`]
/// and [`MessageEndEvent::retriever_resources`] give typed views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEndEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MessageEndEvent {
    pub fn usage(&self) -> Option<Usage> {
        let value = self.metadata.get("usage")?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn retriever_resources(&self) -> Option<Vec<RetrieverResource>> {
        let value = self.metadata.get("retriever_resources")?.clone();
        serde_json::from_value(value).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsMessageEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsMessageEndEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReplaceEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub status: i32,
    pub code: String,
    pub message: String,
}

/// Heartbeat, no payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingEvent {
    #[serde(flatten)]
    pub header: EventHeader,
}

/// Token usage reported by `message_end` metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub prompt_unit_price: String,
    pub prompt_price_unit: String,
    pub prompt_price: String,
    pub completion_tokens: u32,
    pub completion_unit_price: String,
    pub completion_price_unit: String,
    pub completion_price: String,
    pub total_tokens: u32,
    pub total_price: String,
    pub currency: String,
    pub latency: f64,
}

/// One knowledge-retrieval citation reported by `message_end` metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverResource {
    pub position: i64,
    pub dataset_id: String,
    pub dataset_name: String,
    pub document_id: String,
    pub document_name: String,
    pub segment_id: String,
    pub score: f64,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dify::events::DecodeError;

    #[test]
    fn test_decode_message() {
        let line = r#"data: {"event": "message", "task_id": "t1", "message_id": "m1", "conversation_id": "c1", "created_at": 1705395332, "answer": "Osmosis is..."}"#;
        let event = ChatEvent::decode(line).unwrap();
        match &event {
            ChatEvent::Message(msg) => {
                assert_eq!(msg.answer, "Osmosis is...");
                assert_eq!(msg.header.task_id.as_deref(), Some("t1"));
                assert_eq!(msg.header.created_at, Some(1705395332));
            }
            other => panic!("wrong variant: {:?}", other),
        }
        assert_eq!(event.tag(), "message");
    }

    #[test]
    fn test_decode_ping_without_payload() {
        let event = ChatEvent::decode(r#"{"event": "ping"}"#).unwrap();
        assert_eq!(event.tag(), "ping");
    }

    #[test]
    fn test_decode_error_event() {
        let line = r#"{"event": "error", "status": 400, "code": "invalid_param", "message": "bad request", "task_id": "t1"}"#;
        match ChatEvent::decode(line).unwrap() {
            ChatEvent::Error(err) => {
                assert_eq!(err.status, 400);
                assert_eq!(err.code, "invalid_param");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_message_end_metadata_views() {
        let line = r#"{"event": "message_end", "metadata": {"usage": {
            "prompt_tokens": 10, "prompt_unit_price": "0.001", "prompt_price_unit": "0.001",
            "prompt_price": "0.00001", "completion_tokens": 20, "completion_unit_price": "0.002",
            "completion_price_unit": "0.001", "completion_price": "0.00004", "total_tokens": 30,
            "total_price": "0.00005", "currency": "USD", "latency": 1.5}}}"#;
        match ChatEvent::decode(line).unwrap() {
            ChatEvent::MessageEnd(end) => {
                let usage = end.usage().unwrap();
                assert_eq!(usage.total_tokens, 30);
                assert_eq!(usage.currency, "USD");
                assert!(end.retriever_resources().is_none());
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_message_end_empty_metadata() {
        match ChatEvent::decode(r#"{"event": "message_end", "metadata": {}}"#).unwrap() {
            ChatEvent::MessageEnd(end) => assert!(end.usage().is_none()),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_agent_thought_requires_fields() {
        let err = ChatEvent::decode(r#"{"event": "agent_thought", "id": "a"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::SchemaMismatch { tag, .. } if tag == "agent_thought"));
    }

    #[test]
    fn test_reserialized_wire_shape() {
        let line = r#"{"event": "message", "answer": "hi"}"#;
        let event = ChatEvent::decode(line).unwrap();
        let wire: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], "message");
        assert_eq!(wire["answer"], "hi");
        // Absent header fields stay absent after re-serialization.
        assert!(wire.get("task_id").is_none());
    }
}
