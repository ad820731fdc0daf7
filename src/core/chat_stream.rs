//! Streaming chat-completion client.
//!
//! One request per user turn. The response body is consumed incrementally,
//! split into newline-delimited `data:` records, and each text delta is
//! forwarded over an unbounded channel tagged with the stream id. The task
//! never touches application state; the controller applies the messages in
//! the order they arrive.

use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::config::ApiSettings;
use crate::utils::url::deployment_chat_url;

pub const DONE_SENTINEL: &str = "[DONE]";
const DATA_PREFIX: &str = "data:";

#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    /// The endpoint accepted the request; deltas follow.
    Started,
    Chunk(String),
    /// HTTP 429. The request was not processed and may be re-sent.
    RateLimited { retry_after: Option<Duration> },
    Error(String),
    End,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error! status: {status}")]
    Status { status: StatusCode, body: String },

    #[error("stream parsing error: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },

    #[error("stream timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
}

/// One decoded event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(Option<String>),
    Done,
    Ignored,
}

/// Classify a single trimmed line of the response body.
pub fn parse_sse_line(line: &str) -> Result<SseEvent, StreamError> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX).map(str::trim_start) else {
        return Ok(SseEvent::Ignored);
    };
    if payload == DONE_SENTINEL {
        return Ok(SseEvent::Done);
    }
    if payload.trim().is_empty() {
        return Ok(SseEvent::Ignored);
    }

    let response: ChatResponse =
        serde_json::from_str(payload).map_err(|source| StreamError::Parse { source })?;
    Ok(SseEvent::Delta(response.content_delta().map(str::to_owned)))
}

/// Accumulates raw body bytes and yields complete lines. Multi-byte
/// characters split across reads are reassembled before decoding; bytes
/// that are not valid UTF-8 decode to U+FFFD.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let newline_pos = memchr(b'\n', &self.buffer)?;
        let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        Some(decode_line(&line[..newline_pos]))
    }

    /// Remaining bytes after the body ended without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// `Retry-After` in delta-seconds. HTTP-date values are not honoured.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[derive(Debug, PartialEq)]
enum StreamOutcome {
    Completed,
    RateLimited(Option<Duration>),
}

type StreamSender = mpsc::UnboundedSender<(StreamMessage, u64)>;

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, StreamError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(StreamError::MissingSetting(name))
}

/// Returns `true` when the line ends the stream.
fn forward_line(line: &str, tx: &StreamSender, stream_id: u64) -> Result<bool, StreamError> {
    match parse_sse_line(line)? {
        SseEvent::Done => Ok(true),
        SseEvent::Delta(Some(text)) if !text.is_empty() => {
            let _ = tx.send((StreamMessage::Chunk(text), stream_id));
            Ok(false)
        }
        SseEvent::Delta(_) | SseEvent::Ignored => Ok(false),
    }
}

async fn stream_completion(
    client: &reqwest::Client,
    settings: &ApiSettings,
    messages: Vec<ChatMessage>,
    tx: &StreamSender,
    stream_id: u64,
) -> Result<StreamOutcome, StreamError> {
    let endpoint = required(&settings.endpoint, "endpoint")?;
    let deployment = required(&settings.deployment, "deployment")?;
    let api_key = required(&settings.api_key, "api key")?;

    let request = ChatRequest {
        model: settings.model.clone(),
        messages,
        stream: true,
    };

    let response = client
        .post(deployment_chat_url(endpoint, deployment))
        .query(&[("api-version", settings.api_version.as_str())])
        .header("Content-Type", "application/json")
        .header("api-key", api_key)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        return Ok(StreamOutcome::RateLimited(retry_after));
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        debug!(stream_id, %status, body = %body, "completion request rejected");
        return Err(StreamError::Status { status, body });
    }

    let _ = tx.send((StreamMessage::Started, stream_id));

    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::default();
    while let Some(chunk) = body.next().await {
        lines.push(&chunk?);
        while let Some(line) = lines.next_line() {
            if forward_line(&line, tx, stream_id)? {
                return Ok(StreamOutcome::Completed);
            }
        }
    }
    if let Some(line) = lines.finish() {
        if forward_line(&line, tx, stream_id)? {
            return Ok(StreamOutcome::Completed);
        }
    }

    debug!(stream_id, "stream closed without end marker");
    Ok(StreamOutcome::Completed)
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub settings: ApiSettings,
    pub messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
    pub timeout: Option<Duration>,
}

/// Run one completion request to its end, reporting through `tx`.
///
/// Exactly one terminal message (`End`, `RateLimited` or `Error`) is sent
/// unless the token is cancelled, in which case the task stops silently.
pub async fn run_stream(params: StreamParams, tx: StreamSender) {
    let StreamParams {
        client,
        settings,
        messages,
        cancel_token,
        stream_id,
        timeout,
    } = params;

    debug!(stream_id, history = messages.len(), "opening completion stream");

    let work = async {
        let request = stream_completion(&client, &settings, messages, &tx, stream_id);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or_else(|_| Err(StreamError::Timeout(limit))),
            None => request.await,
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            debug!(stream_id, "stream cancelled");
            return;
        }
        outcome = work => outcome,
    };

    let message = match outcome {
        Ok(StreamOutcome::Completed) => StreamMessage::End,
        Ok(StreamOutcome::RateLimited(retry_after)) => {
            debug!(stream_id, ?retry_after, "completion request rate limited");
            StreamMessage::RateLimited { retry_after }
        }
        Err(err) => StreamMessage::Error(err.to_string()),
    };
    let _ = tx.send((message, stream_id));
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: StreamSender,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        tokio::spawn(run_stream(params, self.tx.clone()));
    }
}
