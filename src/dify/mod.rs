//! Agent-platform integration: HTTP client, wire events, file metadata.

pub mod client;
pub mod events;
pub mod file;

pub use client::{Attachment, ChatClient, ChatMessageRequest, DifyClient, ResponseMode, WorkflowClient};
pub use file::{FileMeta, FileType};
