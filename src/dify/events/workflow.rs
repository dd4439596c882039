//! Workflow-family wire events (`/workflows/run` streams).

use super::{EventHeader, WireEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One workflow-stream sub-event, discriminated by the wire `event` tag.
///
/// The tag space overlaps the chat family (`message`, `ping`, ...) but the
/// two registries are independent; a tag registered here is not implicitly
/// registered there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted(WorkflowStartedEvent),
    NodeStarted(NodeStartedEvent),
    NodeFinished(NodeFinishedEvent),
    WorkflowFinished(WorkflowFinishedEvent),
    TtsMessage(TtsEvent),
    TtsMessageEnd(TtsEvent),
    Ping(PingEvent),
    Message(MessageEvent),
    MessageFile(MessageFileEvent),
    MessageEnd(MessageEndEvent),
}

impl WorkflowEvent {
    pub const TAGS: &'static [&'static str] = &[
        "workflow_started",
        "node_started",
        "node_finished",
        "workflow_finished",
        "tts_message",
        "tts_message_end",
        "ping",
        "message",
        "message_file",
        "message_end",
    ];
}

impl WireEvent for WorkflowEvent {
    fn registered(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::WorkflowStarted(_) => "workflow_started",
            Self::NodeStarted(_) => "node_started",
            Self::NodeFinished(_) => "node_finished",
            Self::WorkflowFinished(_) => "workflow_finished",
            Self::TtsMessage(_) => "tts_message",
            Self::TtsMessageEnd(_) => "tts_message_end",
            Self::Ping(_) => "ping",
            Self::Message(_) => "message",
            Self::MessageFile(_) => "message_file",
            Self::MessageEnd(_) => "message_end",
        }
    }
}

/// Run/node status reported by the workflow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub data: WorkflowStartedData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStartedData {
    pub id: String,
    pub workflow_id: String,
    pub sequence_number: u64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub data: NodeStartedData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStartedData {
    pub id: String,
    pub node_id: String,
    pub node_type: String,
    pub title: String,
    pub index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessor_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFinishedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub data: NodeFinishedData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFinishedData {
    pub id: String,
    pub node_id: String,
    pub index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessor_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_metadata: Option<ExecutionMetadata>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFinishedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub data: WorkflowFinishedData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFinishedData {
    pub id: String,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub total_steps: u64,
    pub created_at: i64,
    pub finished_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingEvent {
    #[serde(flatten)]
    pub header: EventHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub answer: String,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEndEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
