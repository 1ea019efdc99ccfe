//! Cancellable SSE consumption shared by both providers.

use askbridge_core::{Error, Result};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Data payload that terminates an upstream stream.
pub(crate) const DONE_MARKER: &str = "[DONE]";

/// How an SSE stream stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// Upstream sent `[DONE]`.
    Done,
    /// The cancellation signal fired first.
    Cancelled,
}

/// Send a request unless the signal fires first. `None` means cancelled.
pub(crate) async fn send_cancellable(
    request: RequestBuilder,
    signal: &CancellationToken,
) -> Result<Option<Response>> {
    tokio::select! {
        biased;
        _ = signal.cancelled() => Ok(None),
        response = request.send() => response.map(Some).map_err(transport_error),
    }
}

/// Read SSE events until `[DONE]`, cancellation, or failure.
///
/// `on_data` sees every non-terminal data payload in arrival order. The
/// signal is checked before each payload, so nothing is delivered once it
/// has fired.
pub(crate) async fn consume<F>(
    response: Response,
    signal: &CancellationToken,
    mut on_data: F,
) -> Result<StreamEnd>
where
    F: FnMut(&str) -> Result<()>,
{
    let mut events = Box::pin(response.bytes_stream().eventsource());

    loop {
        let next = tokio::select! {
            biased;
            _ = signal.cancelled() => {
                debug!("SSE stream cancelled");
                return Ok(StreamEnd::Cancelled);
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                let data = event.data.trim();
                if data == DONE_MARKER {
                    return Ok(StreamEnd::Done);
                }
                if data.is_empty() {
                    continue;
                }
                on_data(data)?;
            }
            Some(Err(EventStreamError::Transport(e))) => return Err(transport_error(e)),
            Some(Err(e)) => return Err(Error::Protocol(format!("SSE stream error: {}", e))),
            None => {
                return Err(Error::Protocol(
                    "Stream ended before the answer completed".into(),
                ))
            }
        }
    }
}

/// Turn a non-2xx response into a provider error.
///
/// Uses the JSON error body when there is a non-empty one, otherwise the
/// status line.
pub(crate) async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_from_body(status, &body)
}

/// [`error_from_response`] that stops reading the body once the signal
/// fires. `None` means cancelled.
pub(crate) async fn error_unless_cancelled(
    response: Response,
    signal: &CancellationToken,
) -> Option<Error> {
    let status = response.status();
    tokio::select! {
        biased;
        _ = signal.cancelled() => {
            debug!("Cancelled while reading {} error body", status.as_u16());
            None
        }
        body = response.text() => Some(error_from_body(status, &body.unwrap_or_default())),
    }
}

fn error_from_body(status: StatusCode, body: &str) -> Error {
    let message = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if !is_empty_json(&value) => value.to_string(),
        _ => format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .trim()
        .to_string(),
    };
    Error::Provider(message)
}

pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Provider(format!("Request timed out: {}", e))
    } else if e.is_connect() {
        Error::Provider(format!("Connection failed: {}", e))
    } else if e.is_decode() {
        Error::Protocol(format!("Malformed response: {}", e))
    } else {
        Error::Provider(format!("Network error: {}", e))
    }
}

fn is_empty_json(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}
