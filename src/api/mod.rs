//! HTTP Handlers
//!
//! Route handlers for the glossary and wikipedia features, plus shared
//! response plumbing. Passthrough routes mirror the upstream status code
//! and body; streaming routes hand the re-emitted stream to axum as a
//! chunked body.

pub mod glossary;
pub mod wikipedia;

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use tracing::error;

pub(crate) fn mirror_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

pub(crate) fn upstream_err(e: reqwest::Error) -> (StatusCode, String) {
    error!("upstream call failed: {}", e);
    (
        StatusCode::BAD_GATEWAY,
        format!("upstream call failed: {}", e),
    )
}

/// Mirror an upstream response to the client: status, content type, body.
pub(crate) async fn passthrough(
    resp: reqwest::Response,
) -> Result<Response, (StatusCode, String)> {
    let status = mirror_status(resp.status());
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let body = resp.bytes().await.map_err(upstream_err)?;
    Ok((status, [(header::CONTENT_TYPE, content_type)], body.to_vec()).into_response())
}

/// If the upstream refused a streaming request, surface its status and
/// body instead of an empty event stream.
pub(crate) async fn reject_unless_success(
    resp: reqwest::Response,
) -> Result<reqwest::Response, (StatusCode, String)> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = mirror_status(resp.status());
    let body = resp.text().await.unwrap_or_default();
    Err((status, body))
}

pub(crate) fn event_stream_response<S>(stream: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream.map(Ok::<_, Infallible>)),
    )
        .into_response()
}

pub(crate) fn text_stream_response<S>(stream: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream.map(Ok::<_, Infallible>)),
    )
        .into_response()
}
