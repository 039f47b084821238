//! Streaming chat response: ordered text fold, tool call delta merging, token usage.
//!
//! A `StreamState` lives for exactly one completion call. It is created when the
//! request starts, folds chunks in arrival order, and is consumed into a
//! `StreamOutcome` when the stream ends, is cut short, or is cancelled.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::{ChatError, map_api_error};

/// Max tool calls to accept from a single response (guards against malformed API).
pub(super) const MAX_TOOL_CALLS: usize = 64;
/// Max size for a single tool call's arguments JSON (64KB).
pub(super) const MAX_TOOL_CALL_ARGS_BYTES: usize = 64 * 1024;

/// Token usage reported by the API (non-streamed responses, or a final usage chunk).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Parse token usage from a response's `usage` field.
pub(crate) fn parse_usage(chunk: &Value) -> Option<TokenUsage> {
    let usage = chunk.get("usage").filter(|u| u.is_object())?;
    Some(TokenUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        completion_tokens: usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        total_tokens: usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
    })
}

fn first_choice(chunk: &Value) -> Option<&Value> {
    chunk.get("choices")?.as_array()?.first()
}

/// Text delta carried by a streamed chunk, if any.
pub fn delta_content(chunk: &Value) -> Option<&str> {
    first_choice(chunk)?.get("delta")?.get("content")?.as_str()
}

/// Merge a tool_calls delta into accumulated tool calls (by index). Arguments are concatenated.
/// Skips deltas with out-of-bounds index to handle malformed API responses.
pub(crate) fn merge_tool_call_delta(acc: &mut Vec<Value>, delta_tc: &Value) {
    let index = match delta_tc["index"].as_u64() {
        Some(i) if i < MAX_TOOL_CALLS as u64 => i as usize,
        _ => return,
    };
    while acc.len() <= index {
        acc.push(json!({
            "id": "",
            "type": "function",
            "function": { "name": "", "arguments": "" }
        }));
    }
    let entry = &mut acc[index];
    if let Some(id) = delta_tc["id"].as_str()
        && !id.is_empty()
    {
        entry["id"] = json!(id);
    }
    if let Some(fn_part) = delta_tc.get("function") {
        if let Some(name) = fn_part["name"].as_str()
            && !name.is_empty()
        {
            entry["function"]["name"] = json!(name);
        }
        if let Some(args) = fn_part["arguments"].as_str()
            && !args.is_empty()
        {
            let current = entry["function"]["arguments"].as_str().unwrap_or("");
            if current.len() + args.len() <= MAX_TOOL_CALL_ARGS_BYTES {
                entry["function"]["arguments"] = json!(format!("{}{}", current, args));
            }
        }
    }
}

/// How a completion call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Complete,
    /// The transport failed or stalled after some chunks arrived; `content` is partial.
    Interrupted { reason: String },
    /// The caller cancelled; `content` is whatever arrived before.
    Cancelled,
}

/// Result of one completion call. Never appended to a conversation automatically.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub content: String,
    pub status: StreamStatus,
    pub chunks: usize,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub tool_calls: Vec<Value>,
}

impl StreamOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == StreamStatus::Complete
    }
}

/// Running state of one in-flight completion.
#[derive(Debug, Default)]
pub struct StreamState {
    text: String,
    chunks: usize,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
    tool_calls: Vec<Value>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one text delta. `None` and `""` leave the text unchanged.
    pub fn push_delta(&mut self, delta: Option<&str>) {
        self.chunks += 1;
        if let Some(text) = delta {
            self.text.push_str(text);
        }
    }

    /// Fold one streamed chunk; returns the text it contributed.
    pub fn push_chunk<'c>(&mut self, chunk: &'c Value) -> Option<&'c str> {
        let delta = delta_content(chunk);
        self.push_delta(delta);

        if let Some(usage) = parse_usage(chunk) {
            self.usage = Some(usage);
        }
        if let Some(choice) = first_choice(chunk) {
            if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
                self.finish_reason = Some(reason.to_string());
            }
            if let Some(tc_arr) = choice["delta"]["tool_calls"].as_array() {
                for tc in tc_arr {
                    merge_tool_call_delta(&mut self.tool_calls, tc);
                }
            }
        }
        delta
    }

    /// Fold a non-streamed response as a single chunk.
    pub fn from_response(response: &Value) -> Self {
        let mut state = Self::new();
        let choice = first_choice(response);
        let message = choice.and_then(|c| c.get("message"));
        state.push_delta(message.and_then(|m| m.get("content")).and_then(|c| c.as_str()));
        state.usage = parse_usage(response);
        state.finish_reason = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(|r| r.as_str())
            .map(String::from);
        if let Some(calls) = message.and_then(|m| m.get("tool_calls")).and_then(|t| t.as_array()) {
            state.tool_calls = calls.iter().take(MAX_TOOL_CALLS).cloned().collect();
        }
        state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    fn into_outcome(self, status: StreamStatus) -> StreamOutcome {
        StreamOutcome {
            content: self.text,
            status,
            chunks: self.chunks,
            finish_reason: self.finish_reason,
            usage: self.usage,
            tool_calls: self.tool_calls,
        }
    }

    pub fn finish(self) -> StreamOutcome {
        self.into_outcome(StreamStatus::Complete)
    }

    pub fn interrupt(self, reason: impl Into<String>) -> StreamOutcome {
        self.into_outcome(StreamStatus::Interrupted {
            reason: reason.into(),
        })
    }

    pub fn cancel(self) -> StreamOutcome {
        self.into_outcome(StreamStatus::Cancelled)
    }
}

/// Cancellation, timeout and live-display hooks for one completion call.
#[derive(Default)]
pub(crate) struct StreamControl<'a> {
    pub on_content_chunk: Option<&'a (dyn Fn(&str) + Send + Sync)>,
    pub cancel_token: Option<&'a CancellationToken>,
    /// Bound on each wait: the initial response and every following chunk.
    pub timeout: Option<Duration>,
}

enum Waited<T> {
    Ready(T),
    Cancelled,
    TimedOut(Duration),
}

/// Await `fut`, racing against cancellation and the configured timeout.
async fn wait_for<F: Future>(fut: F, control: &StreamControl<'_>) -> Waited<F::Output> {
    let bounded = async {
        match control.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| limit),
            None => Ok(fut.await),
        }
    };
    let result = if let Some(token) = control.cancel_token {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Waited::Cancelled,
            result = bounded => result,
        }
    } else {
        bounded.await
    };
    match result {
        Ok(output) => Waited::Ready(output),
        Err(limit) => Waited::TimedOut(limit),
    }
}

/// Await the start of a request; cancellation and timeout become errors.
pub(crate) async fn await_response<F: Future>(
    fut: F,
    control: &StreamControl<'_>,
) -> Result<F::Output, ChatError> {
    match wait_for(fut, control).await {
        Waited::Ready(output) => Ok(output),
        Waited::Cancelled => Err(ChatError::Cancelled),
        Waited::TimedOut(limit) => Err(ChatError::Timeout(limit)),
    }
}

/// Fold a chunk stream into an outcome.
///
/// Failures before the first chunk are returned as errors. Once a chunk has
/// arrived, a transport error or stall ends the stream as `Interrupted` with the
/// partial text kept.
pub(crate) async fn collect_stream<S, E>(
    mut stream: S,
    control: &StreamControl<'_>,
) -> Result<StreamOutcome, ChatError>
where
    S: Stream<Item = Result<Value, E>> + Unpin,
    E: std::fmt::Display + Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    let mut state = StreamState::new();
    loop {
        let item = match wait_for(stream.next(), control).await {
            Waited::Ready(item) => item,
            Waited::Cancelled => return Ok(state.cancel()),
            Waited::TimedOut(limit) => {
                if state.chunks() == 0 {
                    return Err(ChatError::Timeout(limit));
                }
                log::warn!("stream stalled after {} chunks", state.chunks());
                return Ok(state.interrupt(format!("no data received for {:?}", limit)));
            }
        };

        let Some(chunk_result) = item else {
            return Ok(state.finish());
        };

        let failure = match chunk_result {
            Ok(chunk) => match chunk.get("error") {
                Some(err) => ChatError::ApiMessage(
                    err.get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown error")
                        .to_string(),
                ),
                None => {
                    if let Some(delta) = state.push_chunk(&chunk)
                        && !delta.is_empty()
                        && let Some(cb) = control.on_content_chunk
                    {
                        cb(delta);
                    }
                    continue;
                }
            },
            Err(e) => map_api_error(e),
        };

        if state.chunks() == 0 {
            return Err(failure);
        }
        log::warn!("stream interrupted after {} chunks: {}", state.chunks(), failure);
        return Ok(state.interrupt(failure.to_string()));
    }
}
