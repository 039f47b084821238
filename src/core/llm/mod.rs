//! Chat completions through the APIM gateway: request, streaming fold, optional web search tool.

mod agent_loop;
mod error;
mod request;
mod stream;
mod tool_execution;

use std::time::Duration;

use async_openai::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::models;
use crate::core::tools::WebSearchTool;

pub use error::{ChatError, map_api_error};
pub use request::SamplingParams;
pub use stream::{StreamOutcome, StreamState, StreamStatus, TokenUsage};

/// Callback for progress updates during chat (e.g. "Calling API...", "→ bing_web_search: rust").
pub type OnProgress = Box<dyn Fn(&str) + Send + Sync>;

/// Callback for each streamed content chunk (text only).
pub type OnContentChunk = Box<dyn Fn(&str) + Send + Sync>;

/// Optional callbacks and switches for a chat call.
pub struct ChatOptions {
    pub on_progress: Option<OnProgress>,
    pub on_content_chunk: Option<OnContentChunk>,
    pub cancel_token: Option<CancellationToken>,
    /// Stream chunks as they arrive; otherwise wait for the full response.
    pub stream: bool,
    /// Offer the web search tool to the model (needs search credentials).
    pub tools: bool,
    /// Overrides `Config::request_timeout` when set.
    pub timeout: Option<Duration>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            on_progress: None,
            on_content_chunk: None,
            cancel_token: None,
            stream: true,
            tools: false,
            timeout: None,
        }
    }
}

/// Request for a chat turn. The conversation is read, never modified.
pub struct ChatRequest<'a> {
    pub config: &'a Config,
    pub engine: &'a str,
    pub conversation: &'a Conversation,
    pub params: &'a SamplingParams,
    pub options: ChatOptions,
}

/// Send the conversation to `engine` and fold the reply.
///
/// The engine id and sampling values are checked before anything is sent.
/// The returned outcome is not appended to the conversation: the caller commits
/// complete (or partial) replies and abandons the turn otherwise. When tools are
/// enabled, search calls and their results stay local to this request.
pub async fn chat(request: ChatRequest<'_>) -> Result<StreamOutcome, ChatError> {
    let engine = models::lookup(request.engine)?;
    request.params.validate(engine)?;

    let messages = request
        .conversation
        .messages()
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .map_err(|e| ChatError::Other(Box::new(e)))?;

    let search = if request.options.tools {
        match WebSearchTool::from_config(request.config.search.as_ref()) {
            Ok(tool) => Some(tool),
            Err(e) => {
                log::warn!("{}; continuing without tools", e);
                None
            }
        }
    } else {
        None
    };

    log::debug!(
        "[{}] chat via {} ({} messages, stream: {})",
        request.conversation.id(),
        engine.engine_id,
        messages.len(),
        request.options.stream
    );

    let client = Client::with_config(request.config.azure_config(&engine.engine_id));
    let options = &request.options;
    let outcome = agent_loop::run_agent_loop(
        agent_loop::AgentLoopParams {
            client: &client,
            engine: &engine.engine_id,
            sampling: request.params,
            search: search.as_ref(),
            messages,
            stream: options.stream,
        },
        agent_loop::AgentLoopCallbacks {
            on_progress: options.on_progress.as_deref(),
            control: stream::StreamControl {
                on_content_chunk: options.on_content_chunk.as_deref(),
                cancel_token: options.cancel_token.as_ref(),
                timeout: Some(options.timeout.unwrap_or(request.config.request_timeout)),
            },
        },
    )
    .await?;

    log::debug!(
        "[{}] reply finished: {:?}, {} chunks",
        request.conversation.id(),
        outcome.status,
        outcome.chunks
    );
    Ok(outcome)
}
