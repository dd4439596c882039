//! Agent-Platform HTTP Client
//!
//! One [`DifyClient`] per configured credential set, all sharing the
//! process-wide pooled transport. Requests carry bearer-token auth derived
//! from the unwrapped API key; connection-level failures are retried up to
//! three attempts.
//!
//! Non-2xx statuses are NOT treated as errors here; callers inspect the
//! status and decide (passthrough routes mirror it to their own client).

use crate::dify::file::FileType;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Connection-level retry attempts per request
pub const CONNECT_RETRIES: u32 = 3;

/// Base client for the agent platform
#[derive(Debug, Clone)]
pub struct DifyClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl DifyClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Issue one JSON request. The returned response body is not consumed,
    /// so streaming endpoints stay lazily readable; the caller owns closing
    /// it (dropping the response releases the pooled connection).
    ///
    /// A body that fails to serialize surfaces as the send error; nothing
    /// is sent in that case.
    pub async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: Option<Vec<(&'static str, String)>>,
    ) -> reqwest::Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            let mut req = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.api_key);
            if let Some(body) = body {
                req = req.json(body);
            }
            if let Some(query) = &query {
                req = req.query(query);
            }
            match req.send().await {
                Ok(resp) => {
                    debug!("{} {} -> {}", method, url, resp.status());
                    return Ok(resp);
                }
                Err(e) if e.is_connect() && attempt + 1 < CONNECT_RETRIES => {
                    attempt += 1;
                    warn!("connect to {} failed (attempt {}): {}", url, attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Issue one multipart request (file uploads). Multipart bodies are not
    /// replayable, so there is no connection retry on this path.
    pub async fn send_multipart(&self, path: &str, form: Form) -> reqwest::Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
    }
}

/// Response mode requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
    Blocking,
}

/// One file attachment reference in a chat request
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub transfer_method: String,
    pub upload_file_id: String,
}

impl Attachment {
    /// Reference a previously uploaded file.
    pub fn local_file(kind: FileType, upload_file_id: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            transfer_method: "local_file".to_string(),
            upload_file_id: upload_file_id.into(),
        }
    }
}

/// Request body for `/chat-messages`
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageRequest {
    pub inputs: Map<String, Value>,
    pub query: String,
    pub user: String,
    pub response_mode: ResponseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub files: Vec<Attachment>,
}

/// Conversational endpoints of the agent platform
#[derive(Debug, Clone)]
pub struct ChatClient {
    inner: DifyClient,
}

impl ChatClient {
    pub fn new(inner: DifyClient) -> Self {
        Self { inner }
    }

    /// POST /chat-messages. With [`ResponseMode::Streaming`] the response
    /// body is an SSE stream the caller must drain or drop.
    pub async fn create_chat_message(
        &self,
        request: &ChatMessageRequest,
    ) -> reqwest::Result<Response> {
        self.inner
            .send(Method::POST, "/chat-messages", Some(request), None)
            .await
    }

    /// POST /files/upload (multipart)
    pub async fn file_upload(
        &self,
        user: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime_type: Option<&str>,
    ) -> reqwest::Result<Response> {
        let mut part = Part::bytes(bytes).file_name(file_name.to_string());
        if let Some(mime) = mime_type {
            part = part.mime_str(mime)?;
        }
        let form = Form::new().text("user", user.to_string()).part("file", part);
        self.inner.send_multipart("/files/upload", form).await
    }

    /// POST /messages/{id}/feedbacks
    pub async fn create_feedback(
        &self,
        message_id: &str,
        rating: &str,
        user: &str,
        content: Option<&str>,
    ) -> reqwest::Result<Response> {
        let mut body = json!({"rating": rating, "user": user});
        if let Some(content) = content {
            body["content"] = json!(content);
        }
        self.inner
            .send(
                Method::POST,
                &format!("/messages/{}/feedbacks", message_id),
                Some(&body),
                None,
            )
            .await
    }

    /// GET /messages/{id}/suggested
    pub async fn suggested(&self, message_id: &str, user: &str) -> reqwest::Result<Response> {
        self.inner
            .send::<Value>(
                Method::GET,
                &format!("/messages/{}/suggested", message_id),
                None,
                Some(vec![("user", user.to_string())]),
            )
            .await
    }

    /// GET /meta
    pub async fn meta(&self, user: &str) -> reqwest::Result<Response> {
        self.inner
            .send::<Value>(
                Method::GET,
                "/meta",
                None,
                Some(vec![("user", user.to_string())]),
            )
            .await
    }

    /// GET /conversations
    pub async fn conversations(
        &self,
        user: &str,
        last_id: Option<&str>,
        limit: Option<u32>,
        pinned: Option<bool>,
    ) -> reqwest::Result<Response> {
        let mut query = vec![("user", user.to_string())];
        if let Some(last_id) = last_id {
            query.push(("last_id", last_id.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(pinned) = pinned {
            query.push(("pinned", pinned.to_string()));
        }
        self.inner
            .send::<Value>(Method::GET, "/conversations", None, Some(query))
            .await
    }

    /// POST /conversations/{id}/name
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        auto_generate: bool,
        user: &str,
    ) -> reqwest::Result<Response> {
        let body = json!({"name": name, "auto_generate": auto_generate, "user": user});
        self.inner
            .send(
                Method::POST,
                &format!("/conversations/{}/name", conversation_id),
                Some(&body),
                None,
            )
            .await
    }

    /// DELETE /conversations/{id}
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        user: &str,
    ) -> reqwest::Result<Response> {
        let body = json!({"user": user});
        self.inner
            .send(
                Method::DELETE,
                &format!("/conversations/{}", conversation_id),
                Some(&body),
                None,
            )
            .await
    }

    /// GET /messages (history of one conversation)
    pub async fn conversation_messages(
        &self,
        user: &str,
        conversation_id: &str,
        first_id: Option<&str>,
        limit: Option<u32>,
    ) -> reqwest::Result<Response> {
        let mut query = vec![
            ("user", user.to_string()),
            ("conversation_id", conversation_id.to_string()),
        ];
        if let Some(first_id) = first_id {
            query.push(("first_id", first_id.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.inner
            .send::<Value>(Method::GET, "/messages", None, Some(query))
            .await
    }

    /// POST /chat-messages/{task_id}/stop
    pub async fn stop_chat_message(&self, task_id: &str, user: &str) -> reqwest::Result<Response> {
        let body = json!({"user": user});
        self.inner
            .send(
                Method::POST,
                &format!("/chat-messages/{}/stop", task_id),
                Some(&body),
                None,
            )
            .await
    }

    /// POST /text-to-audio
    pub async fn text_to_audio(
        &self,
        text: &str,
        user: &str,
        streaming: bool,
    ) -> reqwest::Result<Response> {
        let body = json!({"text": text, "user": user, "streaming": streaming});
        self.inner
            .send(Method::POST, "/text-to-audio", Some(&body), None)
            .await
    }

    /// POST /audio-to-text (multipart)
    pub async fn audio_to_text(
        &self,
        user: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime_type: Option<&str>,
    ) -> reqwest::Result<Response> {
        let mut part = Part::bytes(bytes).file_name(file_name.to_string());
        if let Some(mime) = mime_type {
            part = part.mime_str(mime)?;
        }
        let form = Form::new()
            .text("user", user.to_string())
            .part("audio_file", part);
        self.inner.send_multipart("/audio-to-text", form).await
    }
}

/// Workflow endpoints of the agent platform
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    inner: DifyClient,
}

impl WorkflowClient {
    pub fn new(inner: DifyClient) -> Self {
        Self { inner }
    }

    /// POST /workflows/run (streaming body of workflow-family events)
    pub async fn run(
        &self,
        inputs: Map<String, Value>,
        user: &str,
        response_mode: ResponseMode,
    ) -> reqwest::Result<Response> {
        let body = json!({
            "inputs": inputs,
            "response_mode": response_mode,
            "user": user,
        });
        self.inner
            .send(Method::POST, "/workflows/run", Some(&body), None)
            .await
    }

    /// POST /workflows/tasks/{task_id}/stop
    pub async fn stop(&self, task_id: &str, user: &str) -> reqwest::Result<Response> {
        let body = json!({"user": user});
        self.inner
            .send(
                Method::POST,
                &format!("/workflows/tasks/{}/stop", task_id),
                Some(&body),
                None,
            )
            .await
    }

    /// GET /workflows/run/{workflow_run_id}
    pub async fn result(&self, workflow_run_id: &str) -> reqwest::Result<Response> {
        self.inner
            .send::<Value>(
                Method::GET,
                &format!("/workflows/run/{}", workflow_run_id),
                None,
                None,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn chat_client(base_url: &str) -> ChatClient {
        ChatClient::new(DifyClient::new(
            Client::new(),
            base_url,
            "app-test-key",
        ))
    }

    #[tokio::test]
    async fn test_chat_message_carries_bearer_and_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat-messages")
                .header("authorization", "Bearer app-test-key")
                .json_body_partial(r#"{"query": "define osmosis", "response_mode": "streaming"}"#);
            then.status(200).body("data: {\"event\":\"ping\"}\n\n");
        });

        let client = chat_client(&server.base_url());
        let request = ChatMessageRequest {
            inputs: Map::new(),
            query: "define osmosis".to_string(),
            user: "tester".to_string(),
            response_mode: ResponseMode::Streaming,
            conversation_id: None,
            files: vec![],
        };
        let resp = client.create_chat_message(&request).await.unwrap();
        assert!(resp.status().is_success());
        mock.assert();
    }

    #[tokio::test]
    async fn test_conversations_query_drops_absent_params() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/conversations")
                .query_param("user", "tester")
                .query_param("limit", "20");
            then.status(200).json_body(serde_json::json!({"data": []}));
        });

        let client = chat_client(&server.base_url());
        let resp = client
            .conversations("tester", None, Some(20), None)
            .await
            .unwrap();
        assert!(resp.status().is_success());
        mock.assert();
    }

    #[tokio::test]
    async fn test_unserializable_body_is_an_error_and_sends_nothing() {
        struct Opaque;
        impl Serialize for Opaque {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not representable"))
            }
        }

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat-messages");
            then.status(200);
        });

        let client = DifyClient::new(Client::new(), server.base_url(), "app-test-key");
        let result = client
            .send(Method::POST, "/chat-messages", Some(&Opaque), None)
            .await;
        assert!(result.is_err());
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_meta_carries_user_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/meta").query_param("user", "tester");
            then.status(200)
                .json_body(serde_json::json!({"tool_icons": {}}));
        });

        let client = chat_client(&server.base_url());
        let resp = client.meta("tester").await.unwrap();
        assert!(resp.status().is_success());
        mock.assert();
    }

    #[tokio::test]
    async fn test_rename_and_delete_conversation() {
        let server = MockServer::start();
        let rename_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/conversations/c1/name")
                .json_body_partial(
                    r#"{"name": "osmosis basics", "auto_generate": false, "user": "tester"}"#,
                );
            then.status(200)
                .json_body(serde_json::json!({"id": "c1", "name": "osmosis basics"}));
        });
        let delete_mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/conversations/c1")
                .json_body_partial(r#"{"user": "tester"}"#);
            then.status(200)
                .json_body(serde_json::json!({"result": "success"}));
        });

        let client = chat_client(&server.base_url());
        let resp = client
            .rename_conversation("c1", "osmosis basics", false, "tester")
            .await
            .unwrap();
        assert!(resp.status().is_success());
        rename_mock.assert();

        let resp = client.delete_conversation("c1", "tester").await.unwrap();
        assert!(resp.status().is_success());
        delete_mock.assert();
    }

    #[tokio::test]
    async fn test_non_2xx_is_not_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path_contains("/suggested");
            then.status(404).body("{\"message\": \"not found\"}");
        });

        let client = chat_client(&server.base_url());
        let resp = client.suggested("missing", "tester").await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_file_upload_multipart() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/files/upload")
                .header("authorization", "Bearer app-test-key")
                .header_exists("content-type");
            then.status(201).json_body(serde_json::json!({
                "id": "f1", "name": "notes.md", "size": 5, "extension": "md",
                "mime_type": "text/markdown", "created_by": "tester",
                "created_at": 1705395332
            }));
        });

        let client = chat_client(&server.base_url());
        let resp = client
            .file_upload("tester", "notes.md", b"hello".to_vec(), Some("text/markdown"))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
        mock.assert();
    }

    #[tokio::test]
    async fn test_workflow_run_and_stop() {
        let server = MockServer::start();
        let run_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/workflows/run")
                .header("authorization", "Bearer app-test-key")
                .json_body_partial(r#"{"response_mode": "streaming", "user": "tester"}"#);
            then.status(200)
                .body("data: {\"event\":\"workflow_started\",\"data\":{\"id\":\"r1\",\"workflow_id\":\"w1\",\"sequence_number\":1,\"created_at\":1705395332}}\n\n");
        });
        let stop_mock = server.mock(|when, then| {
            when.method(POST).path("/workflows/tasks/t1/stop");
            then.status(200).json_body(serde_json::json!({"result": "success"}));
        });

        let client = WorkflowClient::new(DifyClient::new(
            Client::new(),
            server.base_url(),
            "app-test-key",
        ));
        let resp = client
            .run(Map::new(), "tester", ResponseMode::Streaming)
            .await
            .unwrap();
        assert!(resp.status().is_success());
        run_mock.assert();

        let resp = client.stop("t1", "tester").await.unwrap();
        assert!(resp.status().is_success());
        stop_mock.assert();
    }

    #[test]
    fn test_attachment_wire_shape() {
        let attachment = Attachment::local_file(FileType::Image, "f1");
        let value = serde_json::to_value(&attachment).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["transfer_method"], "local_file");
        assert_eq!(value["upload_file_id"], "f1");
    }
}
