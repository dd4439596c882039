//! SSE Re-Streaming
//!
//! Upstream bodies arrive as arbitrary byte chunks; SSE frames are
//! line-oriented. [`LineBuffer`] reassembles complete lines across chunk
//! boundaries, [`data_lines`] reduces a response body to its `data:`
//! payloads, and [`forward_events`] decodes, filters and re-emits typed
//! events as a fresh SSE stream.
//!
//! The unfold state owns the upstream response body, so dropping the
//! returned stream (client disconnect included) releases the upstream
//! connection; the embedded [`Closer`] guarantees the close-side effect
//! runs exactly once.

use std::time::Duration;

use axum::body::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Response;
use tracing::{debug, warn};

use crate::dify::events::WireEvent;

/// Reassembles text lines from a chunked byte stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Next complete line, without its terminator. `\r\n` and `\n` both
    /// terminate.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.find('\n')?;
        let mut line: String = self.buf.drain(..=pos).collect();
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Trailing partial line once the source is exhausted.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Runs its closure exactly once, on explicit drop or unwind.
pub struct Closer(Option<Box<dyn FnOnce() + Send>>);

impl Closer {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

struct LineState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    lines: LineBuffer,
    exhausted: bool,
}

/// Payloads of the `data:` lines in an SSE response body. Other line kinds
/// (comments, event names, blank keep-alives) are skipped without decoding.
pub fn data_lines(resp: Response) -> impl Stream<Item = String> + Send {
    let state = LineState {
        body: resp.bytes_stream().boxed(),
        lines: LineBuffer::new(),
        exhausted: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.lines.next_line() {
                match data_payload(&line) {
                    Some(payload) if !payload.is_empty() => {
                        return Some((payload.to_string(), state))
                    }
                    _ => continue,
                }
            }
            if state.exhausted {
                let rest = state.lines.take_remainder()?;
                match data_payload(&rest) {
                    Some(payload) if !payload.is_empty() => {
                        return Some((payload.to_string(), state))
                    }
                    _ => return None,
                }
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.lines.push(&chunk),
                Some(Err(e)) => {
                    warn!("upstream body error, ending stream: {}", e);
                    state.exhausted = true;
                }
                None => state.exhausted = true,
            }
        }
    })
}

struct ForwardState<F> {
    lines: BoxStream<'static, String>,
    filter: F,
    pacing: Duration,
    yielded_any: bool,
    _closer: Closer,
}

/// Re-emit the events of an upstream SSE response that pass `filter`, each
/// framed as `data: {json}\n\n`. Undecodable payloads are logged and
/// skipped rather than ending the stream. Each frame after the first is
/// delayed by `pacing`.
pub fn forward_events<E, F>(
    resp: Response,
    filter: F,
    pacing: Duration,
) -> impl Stream<Item = String> + Send
where
    E: WireEvent + Send + 'static,
    F: Fn(&E) -> bool + Send + 'static,
{
    let state = ForwardState {
        lines: data_lines(resp).boxed(),
        filter,
        pacing,
        yielded_any: false,
        _closer: Closer::new(|| debug!("upstream event stream closed")),
    };
    stream::unfold(state, |mut state| async move {
        loop {
            let payload = state.lines.next().await?;
            let event = match E::decode(&payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!("skipping upstream event: {}", e);
                    continue;
                }
            };
            if !(state.filter)(&event) {
                continue;
            }
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("dropping unserializable event: {}", e);
                    continue;
                }
            };
            if state.yielded_any {
                tokio::time::sleep(state.pacing).await;
            }
            state.yielded_any = true;
            return Some((format!("data: {}\n\n", json), state));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dify::events::chat::ChatEvent;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_line_buffer_assembles_across_chunks() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: {\"event\":");
        assert!(buf.next_line().is_none());
        buf.push(b"\"ping\"}\n\ndata: tail");
        assert_eq!(buf.next_line().unwrap(), "data: {\"event\":\"ping\"}");
        assert_eq!(buf.next_line().unwrap(), "");
        assert!(buf.next_line().is_none());
        assert_eq!(buf.take_remainder().unwrap(), "data: tail");
        assert!(buf.take_remainder().is_none());
    }

    #[test]
    fn test_line_buffer_strips_crlf() {
        let mut buf = LineBuffer::new();
        buf.push(b"first\r\nsecond\n");
        assert_eq!(buf.next_line().unwrap(), "first");
        assert_eq!(buf.next_line().unwrap(), "second");
    }

    #[test]
    fn test_closer_fires_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let closer = {
            let count = count.clone();
            Closer::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        drop(closer);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closer_fires_when_stream_dropped_early() {
        let count = Arc::new(AtomicUsize::new(0));
        let closer = {
            let count = count.clone();
            Closer::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let mut stream = Box::pin(stream::unfold(
            (0u32, closer),
            |(n, closer)| async move { Some((n, (n + 1, closer))) },
        ));
        assert_eq!(stream.next().await, Some(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    async fn sse_response(body: &str) -> (MockServer, Response) {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });
        let resp = reqwest::get(server.url("/stream")).await.unwrap();
        (server, resp)
    }

    #[tokio::test]
    async fn test_data_lines_skips_non_data_lines() {
        let (_server, resp) = sse_response(concat!(
            ": keep-alive\n",
            "event: message\n",
            "data: one\n\n",
            "data: two\n\n",
        ))
        .await;
        let lines: Vec<String> = data_lines(resp).collect().await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_forward_events_keeps_only_filtered_tags() {
        let (_server, resp) = sse_response(concat!(
            "data: {\"event\": \"ping\"}\n\n",
            "data: {\"event\": \"message\", \"answer\": \"Osmosis is\"}\n\n",
            "data: {\"event\": \"agent_thought\", \"id\": \"t1\", \"position\": 1, \"thought\": \"look it up\"}\n\n",
            "data: {\"event\": \"message_end\", \"metadata\": {}}\n\n",
        ))
        .await;
        let frames: Vec<String> = forward_events::<ChatEvent, _>(
            resp,
            |e| matches!(e, ChatEvent::Message(_) | ChatEvent::MessageEnd(_)),
            Duration::ZERO,
        )
        .collect()
        .await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("data: "));
        assert!(frames[0].ends_with("\n\n"));
        assert!(frames[0].contains("\"event\":\"message\""));
        assert!(frames[0].contains("Osmosis is"));
        assert!(frames[1].contains("\"event\":\"message_end\""));
    }

    #[tokio::test]
    async fn test_forward_events_drop_mid_stream_with_frames_pending() {
        let (_server, resp) = sse_response(concat!(
            "data: {\"event\": \"message\", \"answer\": \"first\"}\n\n",
            "data: {\"event\": \"message\", \"answer\": \"second\"}\n\n",
            "data: {\"event\": \"message_end\", \"metadata\": {}}\n\n",
        ))
        .await;
        let mut frames =
            Box::pin(forward_events::<ChatEvent, _>(resp, |_| true, Duration::ZERO));
        let first = frames.next().await.unwrap();
        assert!(first.contains("\"answer\":\"first\""));
        // Dropping here, with the upstream body unread past the first
        // frame, must release the connection rather than drain it.
        drop(frames);
    }

    #[tokio::test]
    async fn test_forward_events_skips_undecodable_payloads() {
        let (_server, resp) = sse_response(concat!(
            "data: not json\n\n",
            "data: {\"event\": \"made_up_tag\"}\n\n",
            "data: {\"event\": \"message\", \"answer\": \"ok\"}\n\n",
        ))
        .await;
        let frames: Vec<String> =
            forward_events::<ChatEvent, _>(resp, |_| true, Duration::ZERO)
                .collect()
                .await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"answer\":\"ok\""));
    }
}
